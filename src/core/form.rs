use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::types::Debt;

/// Debt fields as submitted by the page: parallel lists, one entry per row.
/// Numeric cells may arrive as JSON numbers or as strings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DebtForm {
    pub name: Vec<String>,
    pub principal: Vec<Value>,
    pub rate: Vec<Value>,
    pub payment: Vec<Value>,
}

/// A parsed row. `rate_percent` is kept as entered for the chat context.
#[derive(Debug, Clone, PartialEq)]
pub struct DebtEntry {
    pub debt: Debt,
    pub rate_percent: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum FormError {
    #[error(
        "form data mismatch: {names} names, {principals} principals, {rates} rates, {payments} payments"
    )]
    LengthMismatch {
        names: usize,
        principals: usize,
        rates: usize,
        payments: usize,
    },

    #[error("{field} #{} is not a number: {value}", .index + 1)]
    InvalidNumber {
        field: &'static str,
        index: usize,
        value: String,
    },
}

pub fn parse_debt_form(form: &DebtForm) -> Result<Vec<DebtEntry>, FormError> {
    let rows = form.name.len();
    if form.principal.len() != rows || form.rate.len() != rows || form.payment.len() != rows {
        return Err(FormError::LengthMismatch {
            names: rows,
            principals: form.principal.len(),
            rates: form.rate.len(),
            payments: form.payment.len(),
        });
    }

    let mut entries = Vec::with_capacity(rows);
    for index in 0..rows {
        let principal = parse_number("principal", index, &form.principal[index])?;
        let rate_percent = parse_number("rate", index, &form.rate[index])?;
        let payment = parse_number("payment", index, &form.payment[index])?;

        // Negative rates are treated as interest-free; NaN passes through to be
        // rejected per debt by the simulator.
        let annual_rate = if rate_percent < 0.0 {
            0.0
        } else {
            rate_percent / 100.0
        };

        entries.push(DebtEntry {
            debt: Debt::new(form.name[index].trim(), principal, annual_rate, payment),
            rate_percent,
        });
    }

    Ok(entries)
}

fn parse_number(field: &'static str, index: usize, value: &Value) -> Result<f64, FormError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| FormError::InvalidNumber {
        field,
        index,
        value: value.to_string(),
    })
}
