//! Scripted navigation of the dashboard.
//!
//! The navigator makes best-effort forward progress: an unlock step or
//! filter control that never becomes clickable is logged and skipped, on the
//! assumption that the view was already unlocked. The one fatal condition
//! is landing on the login page, which means the stored session expired.

#[cfg(feature = "browser")]
mod chrome;
mod driver;
mod page;

#[cfg(feature = "browser")]
pub use chrome::ChromeDriver;
pub use driver::{ElementState, Locator, PageDriver};
pub use page::{DashboardPage, FilterControls, UnlockStep, DEFAULT_TARGET_URL};

use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::duration::{deserialize_duration, format_duration, serialize_duration};
use crate::models::{CategoryReading, Reading, Snapshot};

/// Bounded waits used throughout navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorTiming {
    /// How long to wait for a control to become clickable.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub element_timeout: Duration,
    /// How long to wait for the page to settle after a navigation or click.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub settle_timeout: Duration,
    /// How long to wait for the value to change after applying a filter.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub value_change_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub poll_interval: Duration,
}

impl Default for NavigatorTiming {
    fn default() -> Self {
        Self {
            element_timeout: Duration::from_secs(20),
            settle_timeout: Duration::from_secs(15),
            value_change_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("session expired: browser landed on {url}")]
    SessionExpired { url: String },

    #[error("failed to load {url}: {reason}")]
    Load { url: String, reason: String },
}

/// Result of one unlock step. Only `Succeeded` performed a click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    AlreadySatisfied,
    /// Trigger never became clickable; navigation continued.
    TimedOut { waited: Duration },
    /// Click was attempted and failed; navigation continued.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub name: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueChange {
    Changed,
    /// Timed out; the value read afterwards may predate the filter.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Applied(ValueChange),
    NotApplied { stage: FilterStage, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    Open,
    Select,
    Apply,
}

impl FilterStage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Select => "select",
            Self::Apply => "apply",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterReport {
    pub label: String,
    pub outcome: FilterOutcome,
}

/// Everything that happened on the way to a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationReport {
    pub steps: Vec<StepReport>,
    pub filters: Vec<FilterReport>,
}

#[derive(Debug, Clone)]
pub struct Capture {
    pub snapshot: Snapshot,
    pub report: NavigationReport,
}

pub struct Navigator<'a> {
    driver: &'a dyn PageDriver,
    page: &'a DashboardPage,
    timing: &'a NavigatorTiming,
}

impl<'a> Navigator<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        page: &'a DashboardPage,
        timing: &'a NavigatorTiming,
    ) -> Self {
        Self {
            driver,
            page,
            timing,
        }
    }

    /// Open the dashboard, unlock the target view, and read the total plus
    /// one value per category.
    pub async fn capture(
        &self,
        categories: &[String],
        clock: &dyn Clock,
        tz: Tz,
    ) -> Result<Capture, NavigationError> {
        let mut report = NavigationReport::default();

        self.open_target().await?;
        report.steps = self.unlock().await;

        let date_outcome = self
            .apply_filter(&self.page.date_filter, &self.page.date_option())
            .await;
        report.filters.push(FilterReport {
            label: self.page.date_range.clone(),
            outcome: date_outcome,
        });
        let total = self.read_value("total").await;

        let mut snapshot_categories = Vec::with_capacity(categories.len());
        for category in categories {
            let outcome = self
                .apply_filter(&self.page.product_filter, &self.page.product_option(category))
                .await;
            let reading = match &outcome {
                FilterOutcome::Applied(_) => self.read_value(category).await,
                FilterOutcome::NotApplied { stage, reason } => Reading::unavailable(format!(
                    "filter {} failed: {reason}",
                    stage.as_str()
                )),
            };
            report.filters.push(FilterReport {
                label: category.clone(),
                outcome,
            });
            snapshot_categories.push(CategoryReading::new(category.clone(), reading));
        }

        let snapshot = Snapshot {
            timestamp: clock.local_now(tz),
            total,
            categories: snapshot_categories,
        };
        Ok(Capture { snapshot, report })
    }

    /// Load the target URL and make sure we did not land on a login page.
    pub async fn open_target(&self) -> Result<(), NavigationError> {
        let url = &self.page.target_url;
        info!(url = %url, "Opening dashboard");
        self.driver
            .goto(url)
            .await
            .map_err(|e| NavigationError::Load {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        if let Err(err) = self.driver.settle(self.timing.settle_timeout).await {
            debug!(error = %err, "Page did not report settled; continuing");
        }
        self.check_session().await
    }

    async fn check_session(&self) -> Result<(), NavigationError> {
        let current = match self.driver.current_url().await {
            Ok(url) => url.unwrap_or_default(),
            Err(err) => {
                debug!(error = %err, "Could not read current URL");
                String::new()
            }
        };

        if self.page.is_login_url(&current) {
            return Err(NavigationError::SessionExpired { url: current });
        }
        if let Some(marker) = &self.page.login_marker {
            if self.state(marker).await > ElementState::Missing {
                return Err(NavigationError::SessionExpired { url: current });
            }
        }
        Ok(())
    }

    /// Walk the unlock steps in order. Never fails: each step reports its
    /// own outcome and the next step runs regardless.
    pub async fn unlock(&self) -> Vec<StepReport> {
        let mut reports = Vec::with_capacity(self.page.unlock_steps.len());
        for step in &self.page.unlock_steps {
            let outcome = self.run_step(step).await;
            match &outcome {
                StepOutcome::Succeeded => info!(step = %step.name, "Unlock step done"),
                StepOutcome::AlreadySatisfied => {
                    debug!(step = %step.name, "Unlock step already satisfied")
                }
                StepOutcome::TimedOut { waited } => warn!(
                    step = %step.name,
                    waited = %format_duration(*waited),
                    "Unlock step timed out; assuming already unlocked"
                ),
                StepOutcome::Failed { reason } => warn!(
                    step = %step.name,
                    reason = %reason,
                    "Unlock step failed; continuing"
                ),
            }
            reports.push(StepReport {
                name: step.name.clone(),
                outcome,
            });
        }
        reports
    }

    async fn run_step(&self, step: &UnlockStep) -> StepOutcome {
        if let Some(done) = &step.satisfied_when {
            if self.state(done).await > ElementState::Missing {
                return StepOutcome::AlreadySatisfied;
            }
        }

        let timeout = self.timing.element_timeout;
        if !self.wait_for(&step.trigger, ElementState::Interactable, timeout).await {
            return StepOutcome::TimedOut { waited: timeout };
        }
        if let Err(err) = self.driver.click(&step.trigger).await {
            return StepOutcome::Failed {
                reason: err.to_string(),
            };
        }
        self.settle().await;
        StepOutcome::Succeeded
    }

    /// Open a filter panel, pick `option`, apply, then wait for the value
    /// to move away from what it showed before.
    pub async fn apply_filter(&self, controls: &FilterControls, option: &Locator) -> FilterOutcome {
        let before = self.value_text().await;

        if let Err(reason) = self.click_when_ready(&controls.open).await {
            return not_applied(FilterStage::Open, reason);
        }

        if let Some(clear) = &controls.clear {
            if self.state(clear).await == ElementState::Interactable {
                if let Err(err) = self.driver.click(clear).await {
                    debug!(error = %err, "Clearing previous selection failed");
                }
            }
        }

        if let Err(reason) = self.click_when_ready(option).await {
            return not_applied(FilterStage::Select, reason);
        }
        if let Err(reason) = self.click_when_ready(&controls.apply).await {
            return not_applied(FilterStage::Apply, reason);
        }
        self.settle().await;

        let change = self.wait_for_value_change(before.as_deref()).await;
        if change == ValueChange::Unchanged {
            warn!(
                waited = %format_duration(self.timing.value_change_timeout),
                "Value did not change after applying filter; reading current text"
            );
        }
        FilterOutcome::Applied(change)
    }

    /// Read the value element. Missing or empty text becomes a marker.
    pub async fn read_value(&self, label: &str) -> Reading {
        let locator = &self.page.value;
        if !self
            .wait_for(locator, ElementState::Present, self.timing.element_timeout)
            .await
        {
            warn!(value = %label, "Value element never appeared");
            return Reading::unavailable(format!("timeout waiting for {label}"));
        }

        match self.value_text().await {
            Some(text) if !text.trim().is_empty() => {
                let reading = Reading::from_page_text(&text);
                info!(value = %label, raw = %text.trim(), parsed = %reading, "Captured value");
                reading
            }
            _ => Reading::unavailable(format!("empty text for {label}")),
        }
    }

    async fn value_text(&self) -> Option<String> {
        match self.driver.text(&self.page.value).await {
            Ok(text) => text,
            Err(err) => {
                debug!(error = %err, "Reading value text failed");
                None
            }
        }
    }

    async fn wait_for_value_change(&self, before: Option<&str>) -> ValueChange {
        let deadline = Instant::now() + self.timing.value_change_timeout;
        loop {
            if let Some(current) = self.value_text().await {
                if before.map(str::trim) != Some(current.trim()) {
                    return ValueChange::Changed;
                }
            }
            if !self.pause_until(deadline).await {
                return ValueChange::Unchanged;
            }
        }
    }

    async fn click_when_ready(&self, locator: &Locator) -> Result<(), String> {
        let timeout = self.timing.element_timeout;
        if !self.wait_for(locator, ElementState::Interactable, timeout).await {
            return Err(format!(
                "{locator} not clickable after {}",
                format_duration(timeout)
            ));
        }
        self.driver.click(locator).await.map_err(|e| e.to_string())
    }

    async fn wait_for(&self, locator: &Locator, want: ElementState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state(locator).await >= want {
                return true;
            }
            if !self.pause_until(deadline).await {
                return false;
            }
        }
    }

    /// Sleep one poll interval, or until `deadline`. Returns `false` once
    /// the deadline has passed.
    async fn pause_until(&self, deadline: Instant) -> bool {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(self.timing.poll_interval.min(deadline - now)).await;
        true
    }

    async fn state(&self, locator: &Locator) -> ElementState {
        self.driver.probe(locator).await.unwrap_or_else(|err| {
            debug!(error = %err, "Probe failed; treating element as missing");
            ElementState::Missing
        })
    }

    async fn settle(&self) {
        if let Err(err) = self.driver.settle(self.timing.settle_timeout).await {
            debug!(error = %err, "Page did not settle; continuing");
        }
    }
}

fn not_applied(stage: FilterStage, reason: String) -> FilterOutcome {
    warn!(stage = stage.as_str(), reason = %reason, "Filter not applied; continuing");
    FilterOutcome::NotApplied { stage, reason }
}
