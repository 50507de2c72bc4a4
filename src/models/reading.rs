use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::parse_localized_amount;
use crate::format::format_amount;

/// Prefix written in place of a value that could not be extracted.
pub const UNAVAILABLE_PREFIX: &str = "ERRO: ";

/// One extracted value, or the reason it could not be read.
///
/// Serializes to the same text used in ledger cells, so the JSON snapshot
/// and the CSV row agree on representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Reading {
    Amount(Decimal),
    Unavailable(String),
}

impl Reading {
    /// Build a reading from text scraped off the page.
    pub fn from_page_text(text: &str) -> Self {
        Self::Amount(parse_localized_amount(text))
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// Parse a ledger cell. Anything that is not a plain decimal is kept as
    /// an unavailable marker so it round-trips unchanged.
    pub fn from_cell(cell: &str) -> Self {
        let cell = cell.trim();
        match Decimal::from_str(cell) {
            Ok(value) => Self::Amount(value),
            Err(_) => Self::Unavailable(
                cell.strip_prefix(UNAVAILABLE_PREFIX)
                    .unwrap_or(cell)
                    .to_string(),
            ),
        }
    }

    pub fn to_cell(&self) -> String {
        match self {
            Self::Amount(value) => format_amount(*value),
            Self::Unavailable(reason) => format!("{UNAVAILABLE_PREFIX}{reason}"),
        }
    }

    pub fn amount(&self) -> Option<Decimal> {
        match self {
            Self::Amount(value) => Some(*value),
            Self::Unavailable(_) => None,
        }
    }

    pub fn amount_or_zero(&self) -> Decimal {
        self.amount().unwrap_or(Decimal::ZERO)
    }

    /// Value equality as the ledger sees it: amounts compare numerically
    /// at cell precision, markers compare by text.
    pub fn same_value(&self, other: &Reading) -> bool {
        self.to_cell() == other.to_cell()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cell())
    }
}

impl From<Reading> for String {
    fn from(reading: Reading) -> Self {
        reading.to_cell()
    }
}

impl From<String> for Reading {
    fn from(cell: String) -> Self {
        Reading::from_cell(&cell)
    }
}
