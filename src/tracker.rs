//! One tracking run: capture the dashboard, gate on change, reconcile the
//! ledger, persist the snapshot and publish.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ResolvedConfig;
use crate::format::format_brl;
use crate::git::{try_publish, PublishOutcome};
use crate::ledger::LedgerOutcome;
use crate::models::Snapshot;
use crate::navigator::{Capture, NavigationReport, Navigator, PageDriver};
use crate::snapshot_store::{ChangeDecision, SnapshotStore};

pub trait Publisher: Send + Sync {
    /// Publish `files` after a change. Returns true when something was
    /// committed; failures are logged, never returned.
    fn publish(&self, files: &[PathBuf], message: &str) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn publish(&self, _files: &[PathBuf], _message: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct GitPublisher {
    repo_dir: PathBuf,
    auto_push: bool,
}

impl GitPublisher {
    pub fn new(repo_dir: impl Into<PathBuf>, auto_push: bool) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            auto_push,
        }
    }
}

impl Publisher for GitPublisher {
    fn publish(&self, files: &[PathBuf], message: &str) -> bool {
        match try_publish(&self.repo_dir, files, message, self.auto_push) {
            Ok(PublishOutcome::Pushed) => {
                info!("Committed and pushed ledger");
                true
            }
            Ok(PublishOutcome::Committed) => {
                info!("Committed ledger");
                true
            }
            Ok(PublishOutcome::SkippedNoChanges) => {
                debug!("Publish skipped: no changes");
                false
            }
            Ok(PublishOutcome::SkippedNotRepo { reason }) => {
                warn!("Publishing enabled but skipped: {reason}");
                false
            }
            Err(err) => {
                warn!(error = %err, "Publishing failed");
                false
            }
        }
    }
}

/// Test double that remembers every publish request.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    calls: Mutex<Vec<(Vec<PathBuf>, String)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(Vec<PathBuf>, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, files: &[PathBuf], message: &str) -> bool {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((files.to_vec(), message.to_string()));
        }
        true
    }
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub snapshot: Snapshot,
    pub navigation: NavigationReport,
    /// `None` when the change gate is disabled.
    pub change: Option<ChangeDecision>,
    /// `None` when the gate skipped the ledger.
    pub ledger: Option<LedgerOutcome>,
    pub published: bool,
}

pub struct Tracker {
    config: ResolvedConfig,
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn Publisher>,
}

impl Tracker {
    /// Build a tracker; publishing follows `config.git`.
    pub fn new(config: ResolvedConfig) -> Self {
        let publisher: Arc<dyn Publisher> = if config.git.auto_commit {
            Arc::new(GitPublisher::new(&config.data_dir, config.git.auto_push))
        } else {
            Arc::new(NoopPublisher)
        };
        Self {
            config,
            clock: Arc::new(SystemClock),
            publisher,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Capture through `driver` and record the result.
    ///
    /// An expired session surfaces as a [`crate::navigator::NavigationError`]
    /// inside the returned error.
    pub async fn run(&self, driver: &dyn PageDriver) -> Result<RunReport> {
        if self.config.dashboard.categories.is_empty() {
            warn!("No dashboard categories configured; recording the total only");
        }
        let navigator = Navigator::new(driver, &self.config.dashboard.page, &self.config.timing);
        let capture = navigator
            .capture(
                &self.config.dashboard.categories,
                self.clock.as_ref(),
                self.config.timezone,
            )
            .await?;
        self.record(capture)
    }

    /// Gate, reconcile and publish an already captured snapshot.
    pub fn record(&self, capture: Capture) -> Result<RunReport> {
        let Capture { snapshot, report } = capture;
        let ledger = self.config.csv_ledger();
        let store = self.config.snapshot_store();

        let change = match &store {
            Some(store) => {
                let previous = store.load_or_recover(&ledger)?;
                Some(SnapshotStore::evaluate(previous.as_ref(), &snapshot))
            }
            None => None,
        };

        if change == Some(ChangeDecision::Unchanged) {
            info!(
                total = %snapshot.total,
                "Values unchanged since last snapshot; nothing to record"
            );
            return Ok(RunReport {
                snapshot,
                navigation: report,
                change,
                ledger: None,
                published: false,
            });
        }

        let outcome = ledger.record(&snapshot, self.config.ledger.policy)?;
        info!(
            ledger = %ledger.path().display(),
            policy = self.config.ledger.policy.as_str(),
            outcome = ?outcome,
            "Ledger reconciled"
        );

        let mut files = vec![ledger.path().to_path_buf()];
        if let Some(store) = &store {
            store.save(&snapshot)?;
            files.push(store.path().to_path_buf());
        }

        let published = if outcome.wrote() || store.is_some() {
            let message = format!("ledger {}", snapshot.timestamp.format("%Y-%m-%d %H:%M"));
            self.publisher.publish(&files, &message)
        } else {
            false
        };

        match snapshot.total.amount() {
            Some(total) => info!(
                timestamp = %snapshot.timestamp,
                total = %format_brl(total),
                "Snapshot recorded"
            ),
            None => warn!(
                timestamp = %snapshot.timestamp,
                total = %snapshot.total,
                "Snapshot recorded without a total"
            ),
        }

        Ok(RunReport {
            snapshot,
            navigation: report,
            change,
            ledger: Some(outcome),
            published,
        })
    }

    /// Launch Chrome with the saved session, run, and close the browser on
    /// every exit path.
    #[cfg(feature = "browser")]
    pub async fn run_with_browser(&self) -> Result<RunReport> {
        use crate::navigator::ChromeDriver;

        let source = self.config.session_source();
        let state = match source.resolve() {
            Ok(Some(state)) => Some(state),
            Ok(None) => {
                warn!(
                    file = %source.state_file().display(),
                    "No saved session; continuing without login state"
                );
                None
            }
            Err(err) => {
                warn!(error = %err, "Ignoring unusable session state");
                None
            }
        };

        let driver = ChromeDriver::launch(&self.config.browser).await?;
        let result = async {
            if let Some(state) = &state {
                driver
                    .install_session(state, &self.config.dashboard.page.target_url)
                    .await?;
            }
            self.run(&driver).await
        }
        .await;
        driver.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::Reading;
    use chrono::NaiveDateTime;
    use rust_decimal::Decimal;
    use std::path::Path;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn config(dir: &Path) -> ResolvedConfig {
        let mut config = Config::default();
        config.dashboard.categories = vec!["Curso".to_string(), "Mentoria".to_string()];
        config.resolve(dir).unwrap()
    }

    fn capture(ts: &str, total: &str, curso: &str) -> Capture {
        let ts = NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").unwrap();
        let amount = |s: &str| Reading::Amount(Decimal::from_str(s).unwrap());
        Capture {
            snapshot: Snapshot::new(ts, amount(total))
                .with_category("Curso", amount(curso))
                .with_category("Mentoria", Reading::unavailable("timeout waiting for Mentoria")),
            report: NavigationReport::default(),
        }
    }

    #[test]
    fn unchanged_snapshot_skips_all_side_effects() -> Result<()> {
        let dir = TempDir::new()?;
        let publisher = Arc::new(RecordingPublisher::new());
        let tracker = Tracker::new(config(dir.path())).with_publisher(publisher.clone());

        let first = tracker.record(capture("2025-01-01 10:00:00", "100.00", "40.00"))?;
        assert_eq!(first.change, Some(ChangeDecision::Changed));
        assert_eq!(first.ledger, Some(LedgerOutcome::Created));
        assert!(first.published);

        let ledger_before = std::fs::read_to_string(tracker.config().ledger_path.clone())?;
        let second = tracker.record(capture("2025-01-02 10:00:00", "100.00", "40.00"))?;
        assert_eq!(second.change, Some(ChangeDecision::Unchanged));
        assert_eq!(second.ledger, None);
        assert!(!second.published);
        assert_eq!(
            std::fs::read_to_string(&tracker.config().ledger_path)?,
            ledger_before
        );
        assert_eq!(publisher.calls().len(), 1);
        Ok(())
    }

    #[test]
    fn changed_snapshot_publishes_ledger_and_snapshot() -> Result<()> {
        let dir = TempDir::new()?;
        let publisher = Arc::new(RecordingPublisher::new());
        let tracker = Tracker::new(config(dir.path())).with_publisher(publisher.clone());

        tracker.record(capture("2025-01-01 10:00:00", "100.00", "40.00"))?;
        let report = tracker.record(capture("2025-01-01 12:00:00", "120.00", "60.00"))?;
        assert_eq!(report.ledger, Some(LedgerOutcome::Appended));

        let calls = publisher.calls();
        assert_eq!(calls.len(), 2);
        let (files, message) = &calls[1];
        assert_eq!(
            files,
            &vec![
                tracker.config().ledger_path.clone(),
                tracker.config().snapshot_path.clone()
            ]
        );
        assert_eq!(message, "ledger 2025-01-01 12:00");
        Ok(())
    }

    #[test]
    fn gate_disabled_defers_to_ledger_policy() -> Result<()> {
        let dir = TempDir::new()?;
        let mut config = config(dir.path());
        config.change_gate.enabled = false;
        let tracker = Tracker::new(config).with_publisher(Arc::new(NoopPublisher));

        tracker.record(capture("2025-01-01 10:00:00", "100.00", "40.00"))?;
        let report = tracker.record(capture("2025-01-02 10:00:00", "100.00", "40.00"))?;
        assert_eq!(report.change, None);
        assert_eq!(report.ledger, Some(LedgerOutcome::Skipped));
        assert!(!tracker.config().snapshot_path.exists());
        Ok(())
    }

    #[test]
    fn unreadable_ledger_with_gate_still_appends() -> Result<()> {
        let dir = TempDir::new()?;
        let publisher = Arc::new(RecordingPublisher::new());
        let tracker = Tracker::new(config(dir.path())).with_publisher(publisher.clone());
        let ledger_path = tracker.config().ledger_path.clone();
        std::fs::write(
            &ledger_path,
            b"timestamp,total_value,Curso,Mentoria\n2025-01-01 09:00:00,1.00,Avan\xe7ado,2.00\n",
        )?;

        let report = tracker.record(capture("2025-01-01 10:00:00", "100.00", "40.00"))?;
        assert_eq!(report.change, Some(ChangeDecision::Changed));
        assert_eq!(report.ledger, Some(LedgerOutcome::Appended));
        assert!(tracker.config().snapshot_path.exists());
        assert_eq!(publisher.calls().len(), 1);
        Ok(())
    }
}
