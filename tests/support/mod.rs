#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use assiny_tracker::clock::FixedClock;
use assiny_tracker::config::{Config, ResolvedConfig};
use assiny_tracker::navigator::{DashboardPage, ElementState, Locator, NavigatorTiming, PageDriver};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn run_git(dir: &Path, args: &[&str]) -> Result<std::process::Output> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()?;
    Ok(output)
}

pub fn init_repo(dir: &Path) -> Result<()> {
    let init = run_git(dir, &["init"])?;
    if !init.status.success() {
        anyhow::bail!("git init failed");
    }
    let email = run_git(dir, &["config", "user.email", "test@example.com"])?;
    if !email.status.success() {
        anyhow::bail!("git config user.email failed");
    }
    let name = run_git(dir, &["config", "user.name", "Assiny Test"])?;
    if !name.status.success() {
        anyhow::bail!("git config user.name failed");
    }
    Ok(())
}

/// Waits short enough to keep timeout paths fast.
pub fn fast_timing() -> NavigatorTiming {
    NavigatorTiming {
        element_timeout: Duration::from_millis(150),
        settle_timeout: Duration::from_millis(50),
        value_change_timeout: Duration::from_millis(150),
        poll_interval: Duration::from_millis(10),
    }
}

/// Config rooted at `dir` with fast timings.
pub fn test_config(dir: &Path, categories: &[&str]) -> ResolvedConfig {
    let mut config = Config::default();
    config.dashboard.categories = categories.iter().map(|c| c.to_string()).collect();
    config.timing = fast_timing();
    config.resolve(dir).expect("default config resolves")
}

/// `hour`:00 on 2025-01-`day` in São Paulo (UTC-3).
pub fn clock_at(day: u32, hour: u32) -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2025, 1, day, hour + 3, 0, 0).unwrap())
}

#[derive(Debug, Default)]
struct DashboardState {
    landing_url: Option<String>,
    current_url: Option<String>,
    elements: Vec<(Locator, ElementState)>,
    reveals: Vec<(Locator, Vec<Locator>)>,
    option_values: Vec<(Locator, String)>,
    failing_clicks: Vec<Locator>,
    staged: Option<String>,
    value_text: Option<String>,
    frozen: bool,
    clicks: Vec<Locator>,
    visits: Vec<String>,
}

impl DashboardState {
    fn element(&self, locator: &Locator) -> ElementState {
        self.elements
            .iter()
            .find(|(l, _)| l == locator)
            .map(|(_, s)| *s)
            .unwrap_or(ElementState::Missing)
    }

    fn set(&mut self, locator: Locator, state: ElementState) {
        self.elements.retain(|(l, _)| *l != locator);
        if state != ElementState::Missing {
            self.elements.push((locator, state));
        }
    }
}

/// In-memory stand-in for the dashboard.
///
/// Choosing a filter option stages its value text; clicking the apply
/// button shows the staged text in the value element.
pub struct FakeDashboard {
    page: DashboardPage,
    state: Mutex<DashboardState>,
}

impl FakeDashboard {
    /// Dashboard already on the transactions view with every filter control
    /// clickable and the value element showing `R$ 0,00`.
    pub fn unlocked(page: &DashboardPage) -> Self {
        let mut state = DashboardState::default();
        state.set(page.date_filter.open.clone(), ElementState::Interactable);
        state.set(page.date_filter.apply.clone(), ElementState::Interactable);
        state.set(page.product_filter.open.clone(), ElementState::Interactable);
        state.set(page.product_filter.apply.clone(), ElementState::Interactable);
        state.set(page.value.clone(), ElementState::Present);
        state.value_text = Some("R$ 0,00".to_string());
        Self {
            page: page.clone(),
            state: Mutex::new(state),
        }
    }

    fn state(&mut self) -> &mut DashboardState {
        self.state.get_mut().expect("state lock")
    }

    /// Value shown after applying the date filter.
    pub fn with_total(mut self, text: &str) -> Self {
        let option = self.page.date_option();
        let state = self.state();
        state.set(option.clone(), ElementState::Interactable);
        state.option_values.push((option, text.to_string()));
        self
    }

    /// Value shown after filtering by `category`.
    pub fn with_category(mut self, category: &str, text: &str) -> Self {
        let option = self.page.product_option(category);
        let state = self.state();
        state.set(option.clone(), ElementState::Interactable);
        state.option_values.push((option, text.to_string()));
        self
    }

    pub fn with_element(mut self, locator: Locator, element: ElementState) -> Self {
        self.state().set(locator, element);
        self
    }

    /// Clicking `trigger` makes each of `targets` interactable.
    pub fn reveal_on_click(mut self, trigger: Locator, targets: Vec<Locator>) -> Self {
        self.state().reveals.push((trigger, targets));
        self
    }

    pub fn failing_click(mut self, locator: Locator) -> Self {
        self.state().failing_clicks.push(locator);
        self
    }

    /// Every navigation ends up at `url`.
    pub fn landing_on(mut self, url: &str) -> Self {
        self.state().landing_url = Some(url.to_string());
        self
    }

    /// Applying a filter never updates the value element.
    pub fn frozen_value(mut self) -> Self {
        self.state().frozen = true;
        self
    }

    pub fn clicks(&self) -> Vec<Locator> {
        self.state.lock().expect("state lock").clicks.clone()
    }

    pub fn visits(&self) -> Vec<String> {
        self.state.lock().expect("state lock").visits.clone()
    }

    pub fn clicked(&self, locator: &Locator) -> bool {
        self.clicks().contains(locator)
    }
}

#[async_trait]
impl PageDriver for FakeDashboard {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().expect("state lock");
        state.visits.push(url.to_string());
        state.current_url = Some(state.landing_url.clone().unwrap_or_else(|| url.to_string()));
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>> {
        Ok(self.state.lock().expect("state lock").current_url.clone())
    }

    async fn probe(&self, locator: &Locator) -> Result<ElementState> {
        Ok(self.state.lock().expect("state lock").element(locator))
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let mut state = self.state.lock().expect("state lock");
        state.clicks.push(locator.clone());
        if state.failing_clicks.contains(locator) {
            anyhow::bail!("click intercepted for {locator:?}");
        }
        if state.element(locator) != ElementState::Interactable {
            anyhow::bail!("{locator:?} is not clickable");
        }

        let is_apply =
            *locator == self.page.date_filter.apply || *locator == self.page.product_filter.apply;
        if is_apply && !state.frozen {
            if let Some(text) = state.staged.take() {
                state.value_text = Some(text);
            }
        }
        if let Some(text) = state
            .option_values
            .iter()
            .find(|(l, _)| l == locator)
            .map(|(_, t)| t.clone())
        {
            state.staged = Some(text);
        }
        let revealed: Vec<Locator> = state
            .reveals
            .iter()
            .filter(|(trigger, _)| trigger == locator)
            .flat_map(|(_, targets)| targets.clone())
            .collect();
        for target in revealed {
            state.set(target, ElementState::Interactable);
        }
        Ok(())
    }

    async fn text(&self, locator: &Locator) -> Result<Option<String>> {
        let state = self.state.lock().expect("state lock");
        if *locator == self.page.value && state.element(locator) > ElementState::Missing {
            return Ok(state.value_text.clone());
        }
        Ok(None)
    }

    async fn settle(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}
