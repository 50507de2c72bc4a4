//! Page object for the Assiny transactions dashboard.
//!
//! Every selector the navigator uses lives here. The vendor ships
//! generated class names (`sc-6b5fc9f9-7.blobef`) that change on deploys;
//! when extraction breaks, this is the only file (or the `[dashboard]`
//! config table) that needs touching.

use serde::{Deserialize, Serialize};

use super::Locator;

pub const DEFAULT_TARGET_URL: &str = "https://admin.assiny.com.br/organizations/51082a1f-ee65-47a7-92ef-6f49b7c14134/projects/148350ac-61bc-42b7-87ee-9c8ba95c983c/financial/transactions";

const DATE_FILTER_BUTTON: &str = "body > div:nth-child(1) > div > div.sc-88f1a04b-3.waZHj > main > div > div > section.sectionContent > div > div.sc-901aedfc-0.hankki > div.sc-901aedfc-2.jJUZpK > span:nth-child(2) > div > div > button > button";

const TOTAL_VALUE: &str = "body > div:nth-child(1) > div > div.sc-88f1a04b-3.waZHj > main > div > div > section.sectionContent > div > div.sc-6b5fc9f9-0.fgkMrj > div:nth-child(1) > div:nth-child(1) > div:nth-child(1) > div.sc-6b5fc9f9-7.blobef > div:nth-child(1) > div";

const PRODUCT_FILTER_BUTTON: &str = "body > div:nth-child(1) > div > div.sc-88f1a04b-3.waZHj > main > div > div > section.sectionContent > div > div.sc-901aedfc-0.hankki > div.sc-901aedfc-2.jJUZpK > span:nth-child(3) > div > div > button > button";

/// One optional click on the way to the target view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockStep {
    pub name: String,
    pub trigger: Locator,
    /// An element that only exists once this step is done; if present the
    /// step is skipped.
    #[serde(default)]
    pub satisfied_when: Option<Locator>,
}

/// Controls of a filter panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterControls {
    pub open: Locator,
    /// Clears a previous selection before choosing a new one.
    #[serde(default)]
    pub clear: Option<Locator>,
    pub apply: Locator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardPage {
    pub target_url: String,
    /// URL fragments that mean the browser was bounced to a login page.
    pub login_url_markers: Vec<String>,
    /// Element only rendered on the login page.
    pub login_marker: Option<Locator>,
    pub unlock_steps: Vec<UnlockStep>,
    /// The headline amount the filters act on.
    pub value: Locator,
    pub date_filter: FilterControls,
    /// Visible label of the date-range option to pick.
    pub date_range: String,
    pub product_filter: FilterControls,
    /// Restricts product option lookup to this container, when set.
    pub product_option_scope: Option<String>,
}

impl Default for DashboardPage {
    fn default() -> Self {
        let apply = Locator::button("Aplicar", 1);
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            login_url_markers: vec![
                "/login".to_string(),
                "/signin".to_string(),
                "accounts.google.com".to_string(),
            ],
            login_marker: Some(Locator::css("input[type='password']")),
            unlock_steps: vec![
                UnlockStep {
                    name: "financial menu".to_string(),
                    trigger: Locator::text("Financeiro"),
                    satisfied_when: Some(Locator::css(DATE_FILTER_BUTTON)),
                },
                UnlockStep {
                    name: "transactions tab".to_string(),
                    trigger: Locator::text("Transações"),
                    satisfied_when: Some(Locator::css(DATE_FILTER_BUTTON)),
                },
            ],
            value: Locator::css(TOTAL_VALUE),
            date_filter: FilterControls {
                open: Locator::css(DATE_FILTER_BUTTON),
                clear: None,
                apply: apply.clone(),
            },
            date_range: "Desde Sempre".to_string(),
            product_filter: FilterControls {
                open: Locator::css(PRODUCT_FILTER_BUTTON),
                clear: Some(Locator::text("Limpar")),
                apply,
            },
            product_option_scope: None,
        }
    }
}

impl DashboardPage {
    pub fn date_option(&self) -> Locator {
        Locator::text(&self.date_range)
    }

    pub fn product_option(&self, category: &str) -> Locator {
        let option = Locator::text(category);
        match &self.product_option_scope {
            Some(scope) => option.within(scope.clone()),
            None => option,
        }
    }

    /// True when `url` looks like the login page rather than the dashboard.
    pub fn is_login_url(&self, url: &str) -> bool {
        self.login_url_markers
            .iter()
            .any(|marker| !marker.is_empty() && url.contains(marker.as_str()))
    }
}
