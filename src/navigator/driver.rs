use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How to find one element on the dashboard.
///
/// Serialized as a single-key table so it can be written inline in the
/// config file, e.g. `{ css = "main .total" }` or
/// `{ button = { name = "Aplicar", nth = 1 } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    /// First element matching a CSS selector.
    Css(String),
    /// Innermost element whose visible text equals the given text
    /// (whitespace-collapsed).
    Text(String),
    /// A button by visible text or `aria-label`. `nth` is 0-based and picks
    /// among duplicates, e.g. the second "Aplicar" control on the page.
    Button {
        name: String,
        #[serde(default)]
        nth: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
    /// Resolve `inner` within the first element matching `scope`.
    Scoped { scope: String, inner: Box<Locator> },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn button(name: impl Into<String>, nth: usize) -> Self {
        Self::Button {
            name: name.into(),
            nth,
            scope: None,
        }
    }

    pub fn within(self, scope: impl Into<String>) -> Self {
        Self::Scoped {
            scope: scope.into(),
            inner: Box::new(self),
        }
    }
}

/// Short human form used in logs and ledger markers, e.g. `text Ebook` or
/// `button Aplicar #1`.
impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(selector) => write!(f, "css {selector}"),
            Self::Text(text) => write!(f, "text {text}"),
            Self::Button { name, nth, scope } => {
                write!(f, "button {name} #{nth}")?;
                if let Some(scope) = scope {
                    write!(f, " in {scope}")?;
                }
                Ok(())
            }
            Self::Scoped { scope, inner } => write!(f, "{inner} in {scope}"),
        }
    }
}

/// Readiness of an element, ordered from least to most usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ElementState {
    Missing,
    /// In the DOM but hidden or disabled.
    Present,
    Interactable,
}

/// Browser operations the navigator needs. One implementation drives
/// Chrome; tests substitute a scripted page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url` and wait for the load event.
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<Option<String>>;

    async fn probe(&self, locator: &Locator) -> Result<ElementState>;

    async fn click(&self, locator: &Locator) -> Result<()>;

    /// Rendered text of the element, `None` if it does not exist.
    async fn text(&self, locator: &Locator) -> Result<Option<String>>;

    /// Wait (at most `timeout`) for the page to finish reacting to the last
    /// navigation or click.
    async fn settle(&self, timeout: Duration) -> Result<()>;
}
