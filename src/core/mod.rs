mod context;
mod engine;
mod form;
mod types;

pub use context::{CONTEXT_MARKER, debt_context_message, is_context_message};
pub use engine::{HORIZON_MONTHS, effective_payment, simulate, simulate_debt, simulate_with_seed};
pub use form::{DebtEntry, DebtForm, FormError, parse_debt_form};
pub use types::{
    ChartDataset, Debt, LineChart, PieChart, Rgb, Simulation, Termination, Trajectory,
};
