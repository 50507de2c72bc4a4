use serde::{Deserialize, Serialize};

use super::LedgerError;
use crate::models::{CategoryReading, Reading, Snapshot, TimestampFormat};

/// Column layout of the ledger file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSchema {
    pub timestamp_column: String,
    pub total_column: String,
    /// Category columns in order; also the category list the navigator reads.
    pub categories: Vec<String>,
    pub timestamp_format: TimestampFormat,
}

impl LedgerSchema {
    pub fn new(categories: Vec<String>) -> Self {
        Self {
            timestamp_column: "timestamp".to_string(),
            total_column: "total_value".to_string(),
            categories,
            timestamp_format: TimestampFormat::default(),
        }
    }

    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.categories.len() + 2);
        header.push(self.timestamp_column.clone());
        header.push(self.total_column.clone());
        header.extend(self.categories.iter().cloned());
        header
    }

    /// Compare an on-disk header against this schema, ignoring padding
    /// around cells and a UTF-8 BOM on the first one.
    pub fn header_matches(&self, found: &[String]) -> bool {
        let expected = self.header();
        expected.len() == found.len()
            && expected.iter().zip(found).enumerate().all(|(i, (e, f))| {
                let f = if i == 0 { f.trim_start_matches('\u{feff}') } else { f };
                e.trim() == f.trim()
            })
    }

    pub fn to_row(&self, snapshot: &Snapshot) -> Result<Vec<String>, LedgerError> {
        if snapshot.categories.len() != self.categories.len() {
            return Err(LedgerError::ColumnCount {
                expected: self.categories.len(),
                found: snapshot.categories.len(),
            });
        }

        let mut row = Vec::with_capacity(self.categories.len() + 2);
        row.push(self.timestamp_format.render(snapshot.timestamp));
        row.extend(snapshot.value_cells());
        Ok(row)
    }

    /// Rebuild a snapshot from a data row. Returns `None` when the timestamp
    /// cell does not parse; missing value cells read back as unavailable.
    pub fn from_row(&self, row: &[String]) -> Option<Snapshot> {
        let timestamp = TimestampFormat::parse_any(row.first()?)?;
        let cell = |i: usize| {
            row.get(i)
                .map(|c| Reading::from_cell(c))
                .unwrap_or_else(|| Reading::unavailable("missing column"))
        };

        Some(Snapshot {
            timestamp,
            total: cell(1),
            categories: self
                .categories
                .iter()
                .enumerate()
                .map(|(i, name)| CategoryReading::new(name.clone(), cell(i + 2)))
                .collect(),
        })
    }
}
