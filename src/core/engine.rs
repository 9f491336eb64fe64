use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use super::types::{
    ChartDataset, Debt, LineChart, PieChart, Rgb, Simulation, Termination, Trajectory,
};

/// Hard cap on simulated months (60 years).
pub const HORIZON_MONTHS: u32 = 720;

const PAYOFF_THRESHOLD: f64 = 0.01;
const INTEREST_COVER_FACTOR: f64 = 1.001;
const ZERO_RATE_PAYMENT_FLOOR: f64 = 0.01;
const STAGNATION_MIN_MONTH: u32 = 12;
const STAGNATION_LOOKBACK: usize = 10;
const STAGNATION_RATIO: f64 = 0.9999;
// Past this magnitude an f64 no longer resolves cents.
const CENT_RESOLUTION_LIMIT: f64 = 1e15;

pub fn simulate(debts: &[Debt]) -> Simulation {
    simulate_with_seed(debts, clock_seed())
}

/// Same as [`simulate`] with a fixed color seed.
pub fn simulate_with_seed(debts: &[Debt], seed: u64) -> Simulation {
    let mut rng = Rng::new(seed);

    let mut valid = Vec::with_capacity(debts.len());
    let mut trajectories = Vec::with_capacity(debts.len());
    for debt in debts {
        if !debt.is_valid() {
            warn!(name = %debt.name, "skipping debt with invalid numeric fields");
            continue;
        }
        trajectories.push(simulate_debt(debt));
        valid.push(debt);
    }

    let max_months = trajectories
        .iter()
        .map(|t| t.balances.len())
        .max()
        .unwrap_or(0);

    let datasets = trajectories
        .iter()
        .map(|t| ChartDataset {
            label: t.label.clone(),
            data: pad_series(&t.balances, max_months),
            color: random_color(&mut rng),
        })
        .collect();

    let pie_chart = if valid.is_empty() {
        None
    } else {
        Some(PieChart {
            labels: valid.iter().map(|d| d.name.clone()).collect(),
            data: valid.iter().map(|d| d.principal).collect(),
            colors: valid.iter().map(|_| random_color(&mut rng)).collect(),
        })
    };

    let notices = trajectories.iter().flat_map(trajectory_notices).collect();

    debug!(
        debts = debts.len(),
        simulated = trajectories.len(),
        max_months,
        "simulation finished"
    );

    Simulation {
        line_chart: LineChart {
            months: (0..max_months as u32).collect(),
            datasets,
        },
        pie_chart,
        notices,
        trajectories,
    }
}

/// Payment used every month: the user's minimum, raised just above
/// interest-only on the starting balance when it would not shrink the debt.
pub fn effective_payment(debt: &Debt) -> f64 {
    let monthly_rate = debt.annual_rate / 12.0;
    if monthly_rate > 0.0 {
        debt.min_payment
            .max(debt.principal * monthly_rate * INTEREST_COVER_FACTOR)
    } else {
        debt.min_payment.max(ZERO_RATE_PAYMENT_FLOOR)
    }
}

pub fn simulate_debt(debt: &Debt) -> Trajectory {
    let monthly_rate = debt.annual_rate / 12.0;
    let payment = effective_payment(debt);
    let payment_adjusted = payment > debt.min_payment;
    if payment_adjusted {
        warn!(
            name = %debt.name,
            min_payment = debt.min_payment,
            effective_payment = payment,
            "minimum payment does not cover interest; raised for projection"
        );
    }

    let mut balance = debt.principal;
    let mut balances = Vec::new();
    balances.push(round_cents(balance));
    let mut month = 0_u32;
    let mut stagnated = false;

    while balance > PAYOFF_THRESHOLD && month < HORIZON_MONTHS {
        let interest = balance * monthly_rate;
        let this_payment = if balance < payment {
            balance + interest
        } else {
            payment
        };

        balance = (balance - (this_payment - interest)).max(0.0);
        balances.push(round_cents(balance));
        month += 1;

        if is_stagnant(&balances, month) {
            warn!(
                name = %debt.name,
                month,
                balance,
                "balance not decreasing significantly; freezing projection"
            );
            let last = round_cents(balance);
            balances.resize(HORIZON_MONTHS as usize + 1, last);
            stagnated = true;
            break;
        }
    }

    let termination = if stagnated {
        Termination::Stagnated
    } else if balance > PAYOFF_THRESHOLD {
        Termination::Horizon
    } else {
        Termination::PaidOff
    };

    Trajectory {
        label: debt.name.clone(),
        balances,
        termination,
        effective_payment: payment,
        payment_adjusted,
    }
}

fn is_stagnant(balances: &[f64], month: u32) -> bool {
    if month <= STAGNATION_MIN_MONTH || balances.len() <= STAGNATION_LOOKBACK {
        return false;
    }
    let latest = balances[balances.len() - 1];
    let earlier = balances[balances.len() - STAGNATION_LOOKBACK];
    latest >= earlier * STAGNATION_RATIO
}

fn pad_series(series: &[f64], len: usize) -> Vec<f64> {
    let last = series.last().copied().unwrap_or(0.0);
    let mut padded = series.to_vec();
    if padded.len() < len {
        padded.resize(len, last);
    }
    padded
}

fn trajectory_notices(trajectory: &Trajectory) -> Vec<String> {
    let mut notices = Vec::new();
    if trajectory.payment_adjusted {
        notices.push(format!(
            "{}: minimum payment is too low to reduce the balance; projected with {:.2} per month instead.",
            trajectory.label, trajectory.effective_payment
        ));
    }
    match trajectory.termination {
        Termination::PaidOff => {}
        Termination::Stagnated => notices.push(format!(
            "{}: balance barely decreases at this payment; projection plateaus at {:.2}.",
            trajectory.label,
            trajectory.final_balance()
        )),
        Termination::Horizon => notices.push(format!(
            "{}: not paid off within {} years at this payment.",
            trajectory.label,
            HORIZON_MONTHS / 12
        )),
    }
    notices
}

fn round_cents(value: f64) -> f64 {
    if value.abs() >= CENT_RESOLUTION_LIMIT {
        return value;
    }
    (value * 100.0).round() / 100.0
}

fn random_color(rng: &mut Rng) -> Rgb {
    let bits = rng.next_u64();
    Rgb {
        r: (bits >> 56) as u8,
        g: (bits >> 48) as u8,
        b: (bits >> 40) as u8,
    }
}

fn clock_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    splitmix64(nanos)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }
}
