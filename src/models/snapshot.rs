use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::Reading;

/// How snapshot timestamps are written into the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// `2025-01-01 10:00:00`
    #[default]
    Iso,
    /// `01/01/2025 - 10:00`
    Brazilian,
}

impl TimestampFormat {
    const ISO: &'static str = "%Y-%m-%d %H:%M:%S";
    const BRAZILIAN: &'static str = "%d/%m/%Y - %H:%M";

    pub fn render(self, ts: NaiveDateTime) -> String {
        let pattern = match self {
            Self::Iso => Self::ISO,
            Self::Brazilian => Self::BRAZILIAN,
        };
        ts.format(pattern).to_string()
    }

    /// Parse a timestamp written in either supported format.
    ///
    /// Ledgers written by older runs may mix formats, so reading never
    /// depends on the configured output format.
    pub fn parse_any(text: &str) -> Option<NaiveDateTime> {
        let text = text.trim();
        [Self::ISO, Self::BRAZILIAN, "%Y-%m-%d %H:%M", "%d/%m/%Y %H:%M:%S"]
            .iter()
            .find_map(|pattern| NaiveDateTime::parse_from_str(text, pattern).ok())
    }
}

/// A single category's reading within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReading {
    pub name: String,
    pub reading: Reading,
}

impl CategoryReading {
    pub fn new(name: impl Into<String>, reading: Reading) -> Self {
        Self {
            name: name.into(),
            reading,
        }
    }
}

/// One observation of the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Local wall-clock time in the configured timezone.
    pub timestamp: NaiveDateTime,
    pub total: Reading,
    /// One entry per configured category, in configuration order.
    pub categories: Vec<CategoryReading>,
}

impl Snapshot {
    pub fn new(timestamp: NaiveDateTime, total: Reading) -> Self {
        Self {
            timestamp,
            total,
            categories: Vec::new(),
        }
    }

    pub fn with_category(mut self, name: impl Into<String>, reading: Reading) -> Self {
        self.categories.push(CategoryReading::new(name, reading));
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Ledger cells for the value columns (total first, then categories).
    pub fn value_cells(&self) -> Vec<String> {
        std::iter::once(self.total.to_cell())
            .chain(self.categories.iter().map(|c| c.reading.to_cell()))
            .collect()
    }

    /// True when every value column matches `other`, ignoring timestamps.
    pub fn same_values(&self, other: &Snapshot) -> bool {
        self.value_cells() == other.value_cells()
    }
}
