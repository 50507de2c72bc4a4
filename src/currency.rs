//! Normalization of localized currency text (e.g. `R$ 12.345,67`) into decimals.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

static NON_NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^0-9,.\-]").expect("static regex is valid")
});

/// Parse a currency string as rendered by a pt-BR UI into a decimal.
///
/// When both `,` and `.` appear, `.` is the thousands separator and `,` the
/// decimal separator. A lone `,` is the decimal separator. Anything that
/// does not parse yields zero, so callers cannot tell "R$ 0,00" apart from
/// garbage.
pub fn parse_localized_amount(text: &str) -> Decimal {
    let cleaned = NON_NUMERIC.replace_all(text, "");
    if cleaned.is_empty() {
        return Decimal::ZERO;
    }

    let normalized = match (cleaned.contains(','), cleaned.contains('.')) {
        (true, true) => cleaned.replace('.', "").replace(',', "."),
        (true, false) => cleaned.replace(',', "."),
        _ => cleaned.into_owned(),
    };

    Decimal::from_str(&normalized).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn thousands_dot_and_decimal_comma() {
        assert_eq!(parse_localized_amount("R$ 12.345,67"), dec("12345.67"));
        assert_eq!(parse_localized_amount("R$ 1.234.567,89"), dec("1234567.89"));
    }

    #[test]
    fn decimal_comma_only() {
        assert_eq!(parse_localized_amount("R$ 40,00"), dec("40.00"));
        assert_eq!(parse_localized_amount("  0,5 "), dec("0.5"));
    }

    #[test]
    fn dot_only_is_kept_as_decimal_point() {
        assert_eq!(parse_localized_amount("1234.5"), dec("1234.5"));
    }

    #[test]
    fn negative_amounts_keep_sign() {
        assert_eq!(parse_localized_amount("-R$ 5,25"), dec("-5.25"));
    }

    #[test]
    fn non_breaking_space_and_newlines_are_stripped() {
        assert_eq!(parse_localized_amount("R$\u{a0}9.876,54\n"), dec("9876.54"));
    }

    #[test]
    fn unparseable_input_is_zero() {
        assert_eq!(parse_localized_amount(""), Decimal::ZERO);
        assert_eq!(parse_localized_amount("N/A"), Decimal::ZERO);
        assert_eq!(parse_localized_amount("ERRO: timeout"), Decimal::ZERO);
        assert_eq!(parse_localized_amount("1,2,3"), Decimal::ZERO);
        assert_eq!(parse_localized_amount("--"), Decimal::ZERO);
    }
}
