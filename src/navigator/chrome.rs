//! Chrome driver over the DevTools protocol.
//!
//! Element lookups run as small scripts in the page so that text and
//! button-name locators behave the same as CSS ones.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, CookieSameSite};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ElementState, Locator, PageDriver};
use crate::config::BrowserSettings;
use crate::session::{StorageState, StoredCookie};

const LOCATOR_JS: &str = r#"
const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
const visible = (el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
const resolve = (loc, root) => {
  if (!root) return null;
  if (loc.css !== undefined) return root.querySelector(loc.css);
  if (loc.text !== undefined) {
    const want = norm(loc.text);
    const matches = Array.from(root.querySelectorAll('*')).filter((el) => norm(el.innerText) === want);
    return matches.find((el) => !Array.from(el.children).some((c) => matches.includes(c))) || null;
  }
  if (loc.button !== undefined) {
    const b = loc.button;
    const scope = b.scope ? root.querySelector(b.scope) : root;
    if (!scope) return null;
    const want = norm(b.name);
    const buttons = Array.from(scope.querySelectorAll('button, [role="button"]'))
      .filter((el) => norm(el.innerText) === want || norm(el.getAttribute('aria-label')) === want);
    return buttons[b.nth || 0] || null;
  }
  if (loc.scoped !== undefined) return resolve(loc.scoped.inner, root.querySelector(loc.scoped.scope));
  return null;
};
"#;

/// A single Chrome tab driven through chromiumoxide.
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromeDriver {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let chrome_path = match &settings.chrome_path {
            Some(path) => path.clone(),
            None => find_chrome().context(
                "Chrome/Chromium not found. Install it or set browser.chrome_path in the config.",
            )?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(settings.window_width, settings.window_height)
            .viewport(None)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--lang=pt-BR");
        if !settings.headless {
            builder = builder.with_head();
        }
        if settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(profile) = &settings.profile_dir {
            std::fs::create_dir_all(profile)
                .with_context(|| format!("Failed to create profile dir: {}", profile.display()))?;
            builder = builder.user_data_dir(profile);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                handler_task.abort();
                return Err(err).context("Failed to open browser tab");
            }
        };
        info!(headless = settings.headless, "Browser launched");

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Install cookies and local storage from a saved login.
    ///
    /// Local storage can only be written from a document on the right
    /// origin, so this loads `target_url` once when entries exist.
    pub async fn install_session(&self, state: &StorageState, target_url: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let cookies: Vec<CookieParam> = state
            .live_cookies(now)
            .map(|c| cookie_param(c, target_url))
            .collect();
        let cookie_count = cookies.len();
        if !cookies.is_empty() {
            self.page
                .set_cookies(cookies)
                .await
                .context("Failed to install session cookies")?;
        }

        let entries = state.local_storage_for(target_url);
        if !entries.is_empty() {
            self.page.goto(target_url).await.context("Failed to open target origin")?;
            let pairs: Vec<(&str, &str)> = entries
                .iter()
                .map(|e| (e.name.as_str(), e.value.as_str()))
                .collect();
            let script = format!(
                "(() => {{ for (const [k, v] of {}) {{ localStorage.setItem(k, v); }} return true; }})()",
                serde_json::to_string(&pairs)?
            );
            self.page
                .evaluate(script)
                .await
                .context("Failed to seed local storage")?;
        }

        info!(
            cookies = cookie_count,
            local_storage = entries.len(),
            "Installed session state"
        );
        Ok(())
    }

    /// Close the browser and stop the event handler.
    pub async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser cleanly");
        }
        if let Err(err) = self.browser.wait().await {
            debug!(error = %err, "Browser process wait failed");
        }
        self.handler_task.abort();
        debug!("Browser closed");
    }

    async fn run_locator(&self, locator: &Locator, action: &str) -> Result<serde_json::Value> {
        let script = format!(
            "(() => {{ {LOCATOR_JS} const el = resolve({loc}, document); {action} }})()",
            loc = serde_json::to_string(locator)?,
        );
        let result = self
            .page
            .evaluate(script)
            .await
            .with_context(|| format!("Script failed for {locator}"))?;
        result
            .into_value::<serde_json::Value>()
            .context("Unexpected script result")
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Navigation to {url} failed"))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>> {
        Ok(self.page.url().await?)
    }

    async fn probe(&self, locator: &Locator) -> Result<ElementState> {
        let value = self
            .run_locator(
                locator,
                "if (!el) return 'missing'; \
                 const off = el.disabled || el.getAttribute('aria-disabled') === 'true'; \
                 return visible(el) && !off ? 'interactable' : 'present';",
            )
            .await?;
        Ok(match value.as_str() {
            Some("interactable") => ElementState::Interactable,
            Some("present") => ElementState::Present,
            _ => ElementState::Missing,
        })
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let value = self
            .run_locator(
                locator,
                "if (!el) return false; el.scrollIntoView({block: 'center'}); el.click(); return true;",
            )
            .await?;
        if value.as_bool() != Some(true) {
            anyhow::bail!("Element not found for click: {locator}");
        }
        Ok(())
    }

    async fn text(&self, locator: &Locator) -> Result<Option<String>> {
        let value = self
            .run_locator(
                locator,
                "return el ? (el.innerText || el.textContent || '') : false;",
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn settle(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self
                .page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|r| r.into_value::<String>().ok());
            if state.as_deref() == Some("complete") {
                // Give client-side rendering a moment after the load event.
                tokio::time::sleep(Duration::from_millis(500)).await;
                return Ok(());
            }
            if Instant::now() >= deadline {
                anyhow::bail!("Page still {state:?} after {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

fn cookie_param(cookie: &StoredCookie, target_url: &str) -> CookieParam {
    let mut param = CookieParam::new(cookie.name.clone(), cookie.value.clone());
    // The tab is still on about:blank when cookies go in, so every cookie
    // carries an explicit URL; a stored domain still takes precedence.
    param.url = Some(target_url.to_string());
    param.domain = cookie.domain.clone();
    param.path = cookie.path.clone();
    param.secure = Some(cookie.secure);
    param.http_only = Some(cookie.http_only);
    param.same_site = match cookie.same_site.as_deref() {
        Some("Strict") => Some(CookieSameSite::Strict),
        Some("Lax") => Some(CookieSameSite::Lax),
        Some("None") => Some(CookieSameSite::None),
        _ => None,
    };
    param
}

/// Find a Chrome/Chromium executable.
fn find_chrome() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("CHROME_PATH").map(PathBuf::from) {
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(PathBuf::from(path));
                }
            }
        }
    }

    [
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ]
    .iter()
    .map(Path::new)
    .find(|p| p.exists())
    .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_bound_to_target_url() {
        let cookie = StoredCookie::new("sid", "abc");
        let param = cookie_param(&cookie, "https://admin.assiny.com.br/x");
        assert_eq!(param.url.as_deref(), Some("https://admin.assiny.com.br/x"));
        assert_eq!(param.domain, None);
    }

    #[test]
    fn cookie_keeps_domain_and_same_site() {
        let mut cookie = StoredCookie::new("sid", "abc").with_domain(".assiny.com.br");
        cookie.same_site = Some("Lax".to_string());
        cookie.path = Some("/".to_string());
        let param = cookie_param(&cookie, "https://admin.assiny.com.br/x");
        assert_eq!(param.domain.as_deref(), Some(".assiny.com.br"));
        assert_eq!(param.url.as_deref(), Some("https://admin.assiny.com.br/x"));
        assert_eq!(param.path.as_deref(), Some("/"));
        assert_eq!(param.same_site, Some(CookieSameSite::Lax));
    }

    #[test]
    fn locator_json_matches_script_expectations() {
        let json = serde_json::to_string(&Locator::button("Aplicar", 1)).unwrap();
        assert_eq!(json, r#"{"button":{"name":"Aplicar","nth":1}}"#);
        let json = serde_json::to_string(&Locator::text("Hoje").within(".panel")).unwrap();
        assert_eq!(json, r#"{"scoped":{"scope":".panel","inner":{"text":"Hoje"}}}"#);
    }
}
