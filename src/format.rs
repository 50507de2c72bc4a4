use rust_decimal::{Decimal, RoundingStrategy};

/// Format an amount as a ledger cell: exactly two decimals, `.` separator,
/// rounded half away from zero.
pub fn format_amount(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let body = pad_fraction(&rounded.abs().normalize().to_string(), 2);
    if negative {
        format!("-{body}")
    } else {
        body
    }
}

/// Format an amount the way the dashboard renders it, e.g. `R$ 12.345,67`.
///
/// Only used for log output; ledger cells go through [`format_amount`].
pub fn format_brl(value: Decimal) -> String {
    let cell = format_amount(value);
    let (sign, digits) = match cell.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", cell.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, "00"));
    format!("{sign}R$ {},{frac_part}", group_thousands(int_part, '.'))
}

fn group_thousands(int_part: &str, separator: char) -> String {
    let mut out = String::with_capacity(int_part.len() + int_part.len() / 3);
    let len = int_part.len();
    for (i, ch) in int_part.chars().enumerate() {
        out.push(ch);
        let remaining = len.saturating_sub(i + 1);
        if remaining > 0 && remaining % 3 == 0 {
            out.push(separator);
        }
    }
    out
}

fn pad_fraction(s: &str, dp: usize) -> String {
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    let mut out = String::with_capacity(int_part.len() + 1 + dp);
    out.push_str(int_part);
    out.push('.');
    out.extend(frac_part.chars().take(dp));
    for _ in frac_part.len().min(dp)..dp {
        out.push('0');
    }
    out
}
