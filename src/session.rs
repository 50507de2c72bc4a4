//! Persisted browser login state.
//!
//! The dashboard is reached through a Google login that cannot be automated,
//! so a login is performed once by hand and its cookies and local storage
//! are exported in Playwright's `storage_state` JSON shape:
//!
//! ```json
//! {
//!   "cookies": [{ "name": "sid", "value": "...", "domain": ".assiny.com.br", "path": "/" }],
//!   "origins": [{ "origin": "https://admin.assiny.com.br",
//!                 "localStorage": [{ "name": "token", "value": "..." }] }]
//! }
//! ```
//!
//! In CI the same JSON arrives through an environment variable and is
//! written to the state file before the browser starts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A cookie as exported in a storage state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Unix timestamp in seconds; `-1` marks a session cookie.
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

impl StoredCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
            http_only: false,
            secure: false,
            same_site: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// True when the cookie carries an expiry that is already in the past.
    pub fn is_expired_at(&self, unix_secs: i64) -> bool {
        match self.expires {
            Some(expires) if expires > 0.0 => expires < unix_secs as f64,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginStorage {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
}

/// Browser login state: cookies plus per-origin local storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
}

impl StorageState {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse storage state JSON")
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.is_empty()
    }

    /// Cookies that have not yet expired at `unix_secs`.
    pub fn live_cookies(&self, unix_secs: i64) -> impl Iterator<Item = &StoredCookie> {
        self.cookies.iter().filter(move |c| !c.is_expired_at(unix_secs))
    }

    /// Local storage entries for the origin of `url`, if any.
    pub fn local_storage_for(&self, url: &str) -> &[StorageEntry] {
        self.origins
            .iter()
            .find(|o| url.starts_with(o.origin.trim_end_matches('/')))
            .map(|o| o.local_storage.as_slice())
            .unwrap_or(&[])
    }
}

/// Where the login state comes from.
#[derive(Debug, Clone)]
pub struct SessionSource {
    state_file: PathBuf,
    env_var: Option<String>,
}

impl SessionSource {
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state_file: state_file.into(),
            env_var: None,
        }
    }

    /// Also accept the state from environment variable `name`.
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var = Some(name.into());
        self
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Write the environment-provided state (if any) to the state file.
    ///
    /// Returns `true` when the file was written from the environment.
    pub fn materialize(&self) -> Result<bool> {
        let Some(var) = &self.env_var else {
            return Ok(false);
        };
        let content = match std::env::var(var) {
            Ok(content) if !content.trim().is_empty() => content,
            _ => return Ok(false),
        };
        self.write_state(&content)?;
        Ok(true)
    }

    fn write_state(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.state_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create session dir: {}", parent.display()))?;
        }
        std::fs::write(&self.state_file, content).with_context(|| {
            format!("Failed to write session file: {}", self.state_file.display())
        })?;
        Ok(())
    }

    /// Load the state file. A missing file yields `None`.
    pub fn load(&self) -> Result<Option<StorageState>> {
        let content = match std::fs::read_to_string(&self.state_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read session file: {}", self.state_file.display())
                })
            }
        };

        let state = StorageState::from_json(&content)
            .with_context(|| format!("Invalid session file: {}", self.state_file.display()))?;
        Ok(Some(state))
    }

    /// Materialize from the environment, then load.
    pub fn resolve(&self) -> Result<Option<StorageState>> {
        if self.materialize()? {
            tracing::info!(
                file = %self.state_file.display(),
                "Wrote session state from environment"
            );
        }
        self.load()
    }
}
