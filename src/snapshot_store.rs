//! Last-known snapshot persisted as JSON, used to gate side effects on change.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ledger::CsvLedger;
use crate::models::{Reading, Snapshot};

/// Whether the freshly captured snapshot differs from the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDecision {
    Changed,
    Unchanged,
}

/// On-disk form of the last snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub fingerprint: String,
    pub snapshot: Snapshot,
}

/// Hex SHA-256 over the value fields of a snapshot.
///
/// The timestamp is excluded; categories are hashed in configuration order.
pub fn fingerprint(snapshot: &Snapshot) -> String {
    #[derive(Serialize)]
    struct Canonical<'a> {
        total: &'a Reading,
        categories: Vec<(&'a str, &'a Reading)>,
    }

    let canonical = Canonical {
        total: &snapshot.total,
        categories: snapshot
            .categories
            .iter()
            .map(|c| (c.name.as_str(), &c.reading))
            .collect(),
    };
    // Serializing plain strings and tuples cannot fail.
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredSnapshot>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read snapshot file: {}", self.path.display()))
            }
        };

        let stored = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot file: {}", self.path.display()))?;
        Ok(Some(stored))
    }

    /// Load the stored snapshot, rebuilding it from the ledger's last row
    /// when the JSON file is missing or unreadable.
    pub fn load_or_recover(&self, ledger: &CsvLedger) -> Result<Option<StoredSnapshot>> {
        match self.load() {
            Ok(Some(stored)) => return Ok(Some(stored)),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "Ignoring unreadable snapshot file");
            }
        }

        // An unreadable ledger is left to the reconcile policy to handle.
        let recovered = match ledger.last_snapshot() {
            Ok(recovered) => recovered,
            Err(err) => {
                tracing::warn!(
                    ledger = %ledger.path().display(),
                    error = %err,
                    "Ignoring unreadable ledger during snapshot recovery"
                );
                return Ok(None);
            }
        };
        if recovered.is_some() {
            tracing::info!(
                ledger = %ledger.path().display(),
                "Recovered last snapshot from ledger"
            );
        }
        Ok(recovered.map(|snapshot| StoredSnapshot {
            fingerprint: fingerprint(&snapshot),
            snapshot,
        }))
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let stored = StoredSnapshot {
            fingerprint: fingerprint(snapshot),
            snapshot: snapshot.clone(),
        };
        let content =
            serde_json::to_string_pretty(&stored).context("Failed to serialize snapshot")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write snapshot file: {}", self.path.display()))?;
        Ok(())
    }

    /// Compare `snapshot` against `previous`; no previous snapshot counts as a change.
    pub fn evaluate(previous: Option<&StoredSnapshot>, snapshot: &Snapshot) -> ChangeDecision {
        match previous {
            Some(stored) if stored.fingerprint == fingerprint(snapshot) => ChangeDecision::Unchanged,
            _ => ChangeDecision::Changed,
        }
    }
}
