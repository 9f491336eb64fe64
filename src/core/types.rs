use std::fmt;

use serde::{Serialize, Serializer};

/// One debt as the simulator sees it. `annual_rate` is a fraction (0.15 = 15%).
#[derive(Debug, Clone, PartialEq)]
pub struct Debt {
    pub name: String,
    pub principal: f64,
    pub annual_rate: f64,
    pub min_payment: f64,
}

impl Debt {
    pub fn new(name: impl Into<String>, principal: f64, annual_rate: f64, min_payment: f64) -> Self {
        Self {
            name: name.into(),
            principal,
            annual_rate,
            min_payment,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
            && [self.principal, self.annual_rate, self.min_payment]
                .iter()
                .all(|v| v.is_finite() && *v >= 0.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Termination {
    PaidOff,
    Horizon,
    Stagnated,
}

/// Raw month-by-month balances of a single debt, before padding.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub label: String,
    pub balances: Vec<f64>,
    pub termination: Termination,
    pub effective_payment: f64,
    pub payment_adjusted: bool,
}

impl Trajectory {
    pub fn final_balance(&self) -> f64 {
        self.balances.last().copied().unwrap_or(0.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartDataset {
    pub label: String,
    pub data: Vec<f64>,
    pub color: Rgb,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LineChart {
    pub months: Vec<u32>,
    pub datasets: Vec<ChartDataset>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PieChart {
    pub labels: Vec<String>,
    pub data: Vec<f64>,
    pub colors: Vec<Rgb>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub line_chart: LineChart,
    pub pie_chart: Option<PieChart>,
    pub notices: Vec<String>,
    #[serde(skip)]
    pub trajectories: Vec<Trajectory>,
}
