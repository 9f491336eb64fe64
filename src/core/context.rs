use super::form::DebtEntry;

/// First line of every chat turn that carries submitted debt data.
pub const CONTEXT_MARKER: &str = "[Debt data submitted via form]";

pub fn is_context_message(text: &str) -> bool {
    text.starts_with(CONTEXT_MARKER)
}

/// Renders submitted debts as a chat turn so the model can refer back to them.
/// Rows without a name or with non-finite numbers are left out; `None` when
/// nothing remains.
pub fn debt_context_message(entries: &[DebtEntry]) -> Option<String> {
    let rows: Vec<&DebtEntry> = entries
        .iter()
        .filter(|e| {
            !e.debt.name.is_empty()
                && e.debt.principal.is_finite()
                && e.rate_percent.is_finite()
                && e.debt.min_payment.is_finite()
        })
        .collect();
    if rows.is_empty() {
        return None;
    }

    let mut message = format!("{CONTEXT_MARKER}\nCurrent Debt Information:\n");
    for entry in rows {
        message.push_str(&format!(
            "- Name: {}, Principal: {}, APR: {}%, Min Payment: {}\n",
            entry.debt.name,
            dollars(entry.debt.principal),
            entry.rate_percent,
            dollars(entry.debt.min_payment),
        ));
    }
    Some(message)
}

fn dollars(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Debt;

    fn entry(name: &str, principal: f64, rate_percent: f64, payment: f64) -> DebtEntry {
        DebtEntry {
            debt: Debt::new(name, principal, rate_percent / 100.0, payment),
            rate_percent,
        }
    }

    #[test]
    fn formats_each_debt_on_its_own_line() {
        let message = debt_context_message(&[
            entry("Card", 1200.0, 12.0, 103.0),
            entry("Car", 15_250.5, 4.5, 320.0),
        ])
        .expect("message");

        assert_eq!(
            message,
            "[Debt data submitted via form]\n\
             Current Debt Information:\n\
             - Name: Card, Principal: $1,200.00, APR: 12%, Min Payment: $103.00\n\
             - Name: Car, Principal: $15,250.50, APR: 4.5%, Min Payment: $320.00\n"
        );
        assert!(is_context_message(&message));
    }

    #[test]
    fn skips_unnamed_and_non_finite_rows() {
        assert!(debt_context_message(&[entry("", 100.0, 5.0, 10.0)]).is_none());
        assert!(debt_context_message(&[entry("Odd", f64::NAN, 5.0, 10.0)]).is_none());
        assert!(debt_context_message(&[]).is_none());
    }

    #[test]
    fn dollars_groups_thousands() {
        assert_eq!(dollars(0.0), "$0.00");
        assert_eq!(dollars(999.999), "$1,000.00");
        assert_eq!(dollars(1_234_567.891), "$1,234,567.89");
        assert_eq!(dollars(-42.5), "-$42.50");
    }

    #[test]
    fn plain_messages_are_not_context() {
        assert!(!is_context_message("What should I pay first?"));
    }
}
