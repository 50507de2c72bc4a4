use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::ledger::{CsvLedger, LedgerSchema, ReconcilePolicy};
use crate::models::TimestampFormat;
use crate::navigator::{DashboardPage, NavigatorTiming};
use crate::session::SessionSource;
use crate::snapshot_store::SnapshotStore;

/// Default timezone for snapshot timestamps (UTC-3, no DST).
fn default_timezone() -> String {
    "America/Sao_Paulo".to_string()
}

/// What to read from the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Product names to filter by, in ledger column order.
    pub categories: Vec<String>,

    /// Target URL, selectors and filter labels.
    #[serde(flatten)]
    pub page: DashboardPage,
}

/// Ledger file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger path. If relative, resolved from the data directory.
    pub file: PathBuf,

    pub policy: ReconcilePolicy,

    pub timestamp_format: TimestampFormat,

    pub timestamp_column: String,

    pub total_column: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("valor_assiny.csv"),
            policy: ReconcilePolicy::default(),
            timestamp_format: TimestampFormat::default(),
            timestamp_column: "timestamp".to_string(),
            total_column: "total_value".to_string(),
        }
    }
}

/// Snapshot-based change gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeGateConfig {
    /// When true, an unchanged snapshot skips the ledger and publishing.
    pub enabled: bool,

    /// Snapshot path. If relative, resolved from the data directory.
    pub file: PathBuf,
}

impl Default for ChangeGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: PathBuf::from("last_snapshot.json"),
        }
    }
}

/// Where the saved login comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Storage state file. If relative, resolved from the data directory.
    pub state_file: PathBuf,

    /// Environment variable that, when set, overwrites the state file.
    pub env_var: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("google_login.json"),
            env_var: Some("STORAGE_STATE_JSON".to_string()),
        }
    }
}

/// Browser launch options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,

    /// Explicit Chrome/Chromium binary; searched on PATH when unset.
    pub chrome_path: Option<PathBuf>,

    /// Persistent profile directory; a throwaway profile is used when unset.
    pub profile_dir: Option<PathBuf>,

    pub window_width: u32,

    pub window_height: u32,

    /// Pass `--no-sandbox` (needed in most CI containers).
    pub no_sandbox: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            profile_dir: None,
            window_width: 1920,
            window_height: 1080,
            no_sandbox: true,
        }
    }
}

/// Git publishing of the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Commit the ledger and snapshot after a change.
    pub auto_commit: bool,

    /// Push after a successful commit.
    pub auto_push: bool,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file location.
    /// If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    /// IANA timezone for snapshot timestamps.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    pub dashboard: DashboardConfig,

    pub ledger: LedgerConfig,

    pub change_gate: ChangeGateConfig,

    pub session: SessionConfig,

    pub browser: BrowserSettings,

    pub timing: NavigatorTiming,

    pub git: GitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            timezone: default_timezone(),
            dashboard: DashboardConfig::default(),
            ledger: LedgerConfig::default(),
            change_gate: ChangeGateConfig::default(),
            session: SessionConfig::default(),
            browser: BrowserSettings::default(),
            timing: NavigatorTiming::default(),
            git: GitConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Resolve the data directory path.
    ///
    /// If `data_dir` is set and relative, it's resolved relative to `config_dir`.
    /// If `data_dir` is not set, returns `config_dir`.
    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }

    /// Resolve paths and parse the timezone.
    pub fn resolve(self, config_dir: &Path) -> Result<ResolvedConfig> {
        let data_dir = self.resolve_data_dir(config_dir);
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("Unknown timezone {:?}: {e}", self.timezone))?;

        let in_data_dir = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                data_dir.join(p)
            }
        };

        Ok(ResolvedConfig {
            ledger_path: in_data_dir(&self.ledger.file),
            snapshot_path: in_data_dir(&self.change_gate.file),
            session_file: in_data_dir(&self.session.state_file),
            data_dir: data_dir.clone(),
            timezone,
            dashboard: self.dashboard,
            ledger: self.ledger,
            change_gate: self.change_gate,
            session: self.session,
            browser: self.browser,
            timing: self.timing,
            git: self.git,
        })
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,

    pub ledger_path: PathBuf,

    pub snapshot_path: PathBuf,

    pub session_file: PathBuf,

    pub timezone: Tz,

    pub dashboard: DashboardConfig,

    pub ledger: LedgerConfig,

    pub change_gate: ChangeGateConfig,

    pub session: SessionConfig,

    pub browser: BrowserSettings,

    pub timing: NavigatorTiming,

    pub git: GitConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./assiny.toml` if it exists in current directory
/// 2. `~/.config/assiny-tracker/assiny.toml`
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("assiny.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        let candidate = config_dir.join("assiny-tracker").join("assiny.toml");
        if candidate.exists() {
            return candidate;
        }
    }

    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    ///
    /// The data directory is resolved relative to the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        Config::load(&config_path)?.resolve(config_dir)
    }

    /// Load config, falling back to built-in defaults if the file doesn't exist.
    ///
    /// Without a file, the directory the config would live in is the data directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Config::default().resolve(config_dir)
    }

    pub fn schema(&self) -> LedgerSchema {
        LedgerSchema {
            timestamp_column: self.ledger.timestamp_column.clone(),
            total_column: self.ledger.total_column.clone(),
            categories: self.dashboard.categories.clone(),
            timestamp_format: self.ledger.timestamp_format,
        }
    }

    pub fn csv_ledger(&self) -> CsvLedger {
        CsvLedger::new(&self.ledger_path, self.schema())
    }

    /// The snapshot store, when the change gate is enabled.
    pub fn snapshot_store(&self) -> Option<SnapshotStore> {
        self.change_gate
            .enabled
            .then(|| SnapshotStore::new(&self.snapshot_path))
    }

    pub fn session_source(&self) -> SessionSource {
        let source = SessionSource::new(&self.session_file);
        match &self.session.env_var {
            Some(var) if !var.is_empty() => source.with_env_var(var.clone()),
            _ => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_default_data_dir_is_config_dir() {
        let config = Config::default();
        let config_dir = Path::new("/srv/assiny");
        assert_eq!(config.resolve_data_dir(config_dir), PathBuf::from("/srv/assiny"));
    }

    #[test]
    fn test_relative_data_dir() {
        let config = Config {
            data_dir: Some(PathBuf::from("data")),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_data_dir(Path::new("/srv/assiny")),
            PathBuf::from("/srv/assiny/data")
        );
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let resolved = Config::default().resolve(Path::new("/srv/assiny"))?;
        assert_eq!(resolved.ledger_path, PathBuf::from("/srv/assiny/valor_assiny.csv"));
        assert_eq!(resolved.snapshot_path, PathBuf::from("/srv/assiny/last_snapshot.json"));
        assert_eq!(resolved.session_file, PathBuf::from("/srv/assiny/google_login.json"));
        assert_eq!(resolved.timezone, chrono_tz::America::Sao_Paulo);
        assert_eq!(resolved.ledger.policy, ReconcilePolicy::AppendOnChange);
        assert!(resolved.change_gate.enabled);
        assert!(resolved.browser.headless);
        assert!(!resolved.git.auto_commit);
        assert_eq!(resolved.dashboard.page.date_range, "Desde Sempre");
        assert_eq!(resolved.timing.element_timeout, Duration::from_secs(20));
        Ok(())
    }

    #[test]
    fn test_load_full_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("assiny.toml");

        let mut file = std::fs::File::create(&config_path)?;
        write!(
            file,
            r##"
data_dir = "./data"
timezone = "America/Bahia"

[dashboard]
categories = ["Curso Online", "Mentoria"]
date_range = "Hoje"
target_url = "https://admin.assiny.com.br/x"

[dashboard.date_filter]
open = {{ css = "#date" }}
apply = {{ button = {{ name = "Aplicar", nth = 1 }} }}

[ledger]
file = "/var/lib/assiny/ledger.csv"
policy = "overwrite_same_day"
timestamp_format = "brazilian"

[change_gate]
enabled = false

[session]
env_var = "ASSINY_STATE"

[browser]
headless = false

[timing]
element_timeout = "5s"
poll_interval = "250ms"

[git]
auto_commit = true
auto_push = true
"##
        )?;

        let resolved = ResolvedConfig::load(&config_path)?;
        let data_dir = dir.path().canonicalize()?.join("data");
        assert_eq!(resolved.data_dir, data_dir);
        assert_eq!(resolved.ledger_path, PathBuf::from("/var/lib/assiny/ledger.csv"));
        assert_eq!(resolved.session_file, data_dir.join("google_login.json"));
        assert_eq!(resolved.timezone, chrono_tz::America::Bahia);
        assert_eq!(resolved.dashboard.categories, vec!["Curso Online", "Mentoria"]);
        assert_eq!(resolved.dashboard.page.date_range, "Hoje");
        assert_eq!(resolved.ledger.policy, ReconcilePolicy::OverwriteSameDay);
        assert_eq!(resolved.ledger.timestamp_format, TimestampFormat::Brazilian);
        assert!(resolved.snapshot_store().is_none());
        assert!(!resolved.browser.headless);
        assert_eq!(resolved.timing.element_timeout, Duration::from_secs(5));
        assert_eq!(resolved.timing.poll_interval, Duration::from_millis(250));
        assert_eq!(resolved.timing.value_change_timeout, Duration::from_secs(20));
        assert!(resolved.git.auto_commit && resolved.git.auto_push);

        let schema = resolved.schema();
        assert_eq!(
            schema.header(),
            vec!["timestamp", "total_value", "Curso Online", "Mentoria"]
        );
        Ok(())
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let config = Config {
            timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(config.resolve(Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("assiny.toml");

        let resolved = ResolvedConfig::load_or_default(&config_path)?;
        assert_eq!(resolved.data_dir, dir.path());
        assert_eq!(resolved.ledger_path, dir.path().join("valor_assiny.csv"));
        Ok(())
    }
}
