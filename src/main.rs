use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use assiny_tracker::config::{default_config_path, ResolvedConfig};
use assiny_tracker::navigator::NavigationError;
use assiny_tracker::tracker::{RunReport, Tracker};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str =
    "info,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off";

#[derive(Parser)]
#[command(name = "assiny-tracker")]
#[command(about = "Record Assiny dashboard totals into a CSV ledger")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Show the browser window instead of running headless
    #[arg(long)]
    headed: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Capture the dashboard and update the ledger (default)
    Run,
    /// Show current configuration
    Config,
}

fn init_logging(json: bool) {
    let registry = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    );
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);
    if json {
        registry.with(layer.json()).init();
    } else {
        registry.with(layer).init();
    }
}

fn print_config(path: &Path, config: &ResolvedConfig) {
    println!("Config file: {}", path.display());
    println!("Data directory: {}", config.data_dir.display());
    println!("Timezone: {}", config.timezone);
    println!("Target URL: {}", config.dashboard.page.target_url);
    println!("Date range: {}", config.dashboard.page.date_range);
    if config.dashboard.categories.is_empty() {
        println!("Categories: (none, only the total is recorded)");
    } else {
        println!("Categories: {}", config.dashboard.categories.join(", "));
    }
    println!(
        "Ledger: {} ({})",
        config.ledger_path.display(),
        config.ledger.policy.as_str()
    );
    if config.change_gate.enabled {
        println!("Snapshot: {}", config.snapshot_path.display());
    } else {
        println!("Snapshot: disabled");
    }
    println!("Session file: {}", config.session_file.display());
    if let Some(var) = &config.session.env_var {
        println!("Session env var: {var}");
    }
    println!("Headless: {}", config.browser.headless);
    println!(
        "Git: auto_commit={} auto_push={}",
        config.git.auto_commit, config.git.auto_push
    );
}

fn log_report(report: &RunReport) {
    info!(
        timestamp = %report.snapshot.timestamp,
        total = %report.snapshot.total,
        steps = report.navigation.steps.len(),
        filters = report.navigation.filters.len(),
        change = ?report.change,
        ledger = ?report.ledger,
        published = report.published,
        "Run complete"
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let mut config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;
    if cli.headed {
        config.browser.headless = false;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Config => print_config(&cli.config, &config),
        Command::Run => {
            let tracker = Tracker::new(config);
            match tracker.run_with_browser().await {
                Ok(report) => log_report(&report),
                // Failures inside a run end the run, not the process.
                Err(err) => match err.downcast_ref::<NavigationError>() {
                    Some(NavigationError::SessionExpired { url }) => error!(
                        url = %url,
                        "Session expired; export a fresh login state and retry"
                    ),
                    _ => error!(error = ?err, "Run failed"),
                },
            }
        }
    }

    Ok(())
}
