//! CSV ledger of dashboard snapshots.
//!
//! The ledger is a flat file with a fixed header
//! (`timestamp, total_value, <category>...`) and one row per recorded
//! snapshot. How a new snapshot merges into it is decided by a
//! [`ReconcilePolicy`].

mod csv_file;
mod schema;

pub use csv_file::{CsvLedger, LedgerContents};
pub use schema::LedgerSchema;

use serde::{Deserialize, Serialize};

/// Rule for merging a new snapshot into existing ledger rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Every run adds a row.
    AlwaysAppend,
    /// Replace the last row when it was recorded on the same calendar day.
    OverwriteSameDay,
    /// Add a row only when a value column differs from the last row.
    #[default]
    AppendOnChange,
}

impl ReconcilePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlwaysAppend => "always_append",
            Self::OverwriteSameDay => "overwrite_same_day",
            Self::AppendOnChange => "append_on_change",
        }
    }
}

/// What happened to the ledger file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// File was missing, empty or header-only; first data row written.
    Created,
    Appended,
    Overwritten,
    /// Values matched the last row; nothing written.
    Skipped,
}

impl LedgerOutcome {
    pub fn wrote(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger header mismatch in {path}: expected {expected:?}, found {found:?}")]
    HeaderMismatch {
        path: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("snapshot has {found} category values but the ledger has {expected} category columns")]
    ColumnCount { expected: usize, found: usize },

    #[error("failed to read ledger {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write ledger {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
