//! Sitemap-Watch main entry point
//!
//! This is the command-line interface for the Sitemap-Watch monitor.

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use sitemap_watch::config::{load_config_with_hash, Config};
use sitemap_watch::crawler::{run_sites, Orchestrator};
use sitemap_watch::notify::{build_notifier, message, WorkflowContext, WorkflowOutcome};
use sitemap_watch::output::{self, load_site_statistics, RunSummary};
use sitemap_watch::storage::{open_storage, MonitoringMode, NewSite, SqliteStorage, Storage};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Sitemap-Watch: new page discovery through sitemaps
///
/// Sitemap-Watch walks the sitemaps of registered sites, records every page
/// URL it finds, and sends a webhook notification when new pages appear.
#[derive(Parser, Debug)]
#[command(name = "sitemap-watch")]
#[command(version)]
#[command(about = "Watches sitemaps for newly published pages", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    /// External run identifier stored with crawl history
    #[arg(long, env = "GITHUB_RUN_ID", global = true)]
    run_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database schema
    Init,

    /// Validate the configuration and show the effective settings
    Check,

    /// Register a site
    AddSite {
        /// Display name
        #[arg(long)]
        name: String,

        /// Site base URL, used to resolve relative sitemap references
        #[arg(long)]
        base_url: String,

        /// Root sitemap or sitemap index URL
        #[arg(long)]
        sitemap_url: Option<String>,

        /// Monitoring mode (sitemap, full-crawl, partial-crawl)
        #[arg(long, default_value = "sitemap")]
        mode: MonitoringMode,

        /// User agent override for this site
        #[arg(long)]
        user_agent: Option<String>,

        /// Proxy URL for this site
        #[arg(long)]
        proxy: Option<String>,

        /// Register the site disabled
        #[arg(long)]
        disabled: bool,

        /// Do not send notifications for this site
        #[arg(long)]
        no_notify: bool,
    },

    /// List registered sites
    ListSites,

    /// Enable a site
    Enable {
        #[arg(long)]
        site: i64,
    },

    /// Disable a site
    Disable {
        #[arg(long)]
        site: i64,
    },

    /// Run one monitoring cycle for a site
    Run {
        #[arg(long)]
        site: i64,
    },

    /// Run one monitoring cycle for every enabled site
    RunAll,

    /// Show recent crawl history for a site
    History {
        #[arg(long)]
        site: i64,

        /// Number of records to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Send a test notification
    TestNotify,

    /// Send a workflow success or failure report
    Report {
        #[arg(long, value_enum)]
        outcome: OutcomeArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutcomeArg {
    Success,
    Failure,
}

impl From<OutcomeArg> for WorkflowOutcome {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Success => WorkflowOutcome::Success,
            OutcomeArg::Failure => WorkflowOutcome::Failure,
        }
    }
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Init => handle_init(&config),
        Command::Check => handle_check(&config),
        Command::AddSite {
            name,
            base_url,
            sitemap_url,
            mode,
            user_agent,
            proxy,
            disabled,
            no_notify,
        } => {
            let site = NewSite {
                name,
                base_url,
                sitemap_url,
                monitoring_mode: mode,
                user_agent,
                proxy_url: proxy,
                enabled: !disabled,
                notifications_enabled: !no_notify,
            };
            handle_add_site(&config, site)
        }
        Command::ListSites => handle_list_sites(&config),
        Command::Enable { site } => handle_set_enabled(&config, site, true),
        Command::Disable { site } => handle_set_enabled(&config, site, false),
        Command::Run { site } => handle_run(config, site, cli.run_id).await,
        Command::RunAll => handle_run_all(config, cli.run_id).await,
        Command::History { site, limit } => handle_history(&config, site, limit),
        Command::TestNotify => handle_test_notify(&config).await,
        Command::Report { outcome } => handle_report(&config, outcome.into()).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitemap_watch=info,warn"),
            1 => EnvFilter::new("sitemap_watch=debug,info"),
            2 => EnvFilter::new("sitemap_watch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_database(config: &Config) -> Result<SqliteStorage, Box<dyn std::error::Error>> {
    Ok(open_storage(Path::new(&config.storage.database_path))?)
}

/// Creates the database and its schema
fn handle_init(config: &Config) -> CliResult {
    open_database(config)?;
    println!("✓ Database initialized at {}", config.storage.database_path);
    Ok(())
}

/// Validates the configuration and shows the effective settings
fn handle_check(config: &Config) -> CliResult {
    println!("=== Sitemap-Watch Configuration ===\n");

    println!("HTTP:");
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!(
        "  Default user agent: {}",
        config.http.default_user_agent.as_deref().unwrap_or("(rotation pool)")
    );
    println!("  Rotation pool: {} agents", config.http.user_agents.len());
    println!("  Politeness delay: {}ms", config.http.politeness_delay_ms);
    println!(
        "  Retries: {} attempts, backoff {}ms..{}ms",
        config.http.max_attempts, config.http.backoff_base_ms, config.http.backoff_cap_ms
    );

    println!("\nWalker:");
    println!("  Max sitemaps: {}", config.walker.max_sitemaps);
    println!("  Max depth: {}", config.walker.max_depth);
    println!("  URL identity: {:?}", config.diff.url_identity);

    println!("\nRunner:");
    println!("  Max concurrent sites: {}", config.runner.max_concurrent_sites);
    println!("  Site delay: {}ms", config.runner.site_delay_ms);
    println!("  Cycle timeout: {}s", config.runner.cycle_timeout_secs);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nNotifications:");
    match &config.notify.webhook_url {
        Some(_) => println!(
            "  Webhook: configured ({})",
            if config.notify.secret.is_some() { "signed" } else { "unsigned" }
        ),
        None => println!("  Webhook: not configured"),
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

fn handle_add_site(config: &Config, site: NewSite) -> CliResult {
    if site.monitoring_mode == MonitoringMode::Sitemap
        && site.sitemap_url.as_deref().map_or(true, |u| u.trim().is_empty())
    {
        return Err("--sitemap-url is required for sitemap monitoring".into());
    }

    let mut storage = open_database(config)?;
    let site_id = storage.insert_site(&site)?;
    tracing::info!(site_id, name = %site.name, "Site registered");
    println!("✓ Registered site [{}] {}", site_id, site.name);

    if !site.monitoring_mode.is_implemented() {
        println!(
            "  note: monitoring mode '{}' is not implemented, the site will be skipped",
            site.monitoring_mode
        );
    }
    Ok(())
}

fn handle_list_sites(config: &Config) -> CliResult {
    let storage = open_database(config)?;
    let stats = storage
        .list_sites()?
        .iter()
        .map(|site| load_site_statistics(&storage, site, 50))
        .collect::<Result<Vec<_>, _>>()?;

    output::print_site_list(&stats);
    Ok(())
}

fn handle_set_enabled(config: &Config, site_id: i64, enabled: bool) -> CliResult {
    let mut storage = open_database(config)?;
    storage.set_site_enabled(site_id, enabled)?;
    println!(
        "✓ Site [{}] {}",
        site_id,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn handle_history(config: &Config, site_id: i64, limit: usize) -> CliResult {
    let storage = open_database(config)?;
    let site = storage
        .get_site(site_id)?
        .ok_or_else(|| format!("site {} not found", site_id))?;
    let runs = storage.recent_runs(site_id, limit)?;

    output::print_history(&site, &runs);
    Ok(())
}

/// Builds the orchestrator shared by `run` and `run-all`
fn build_orchestrator(
    config: Config,
    run_id: Option<String>,
) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let storage: Arc<Mutex<dyn Storage>> = Arc::new(Mutex::new(open_database(&config)?));
    let notifier = build_notifier(&config)?;
    Ok(Orchestrator::new(Arc::new(config), storage, notifier).with_run_identifier(run_id))
}

/// Cancels `token` on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling in-flight cycles");
            child.cancel();
        }
    });
    token
}

async fn handle_run(config: Config, site_id: i64, run_id: Option<String>) -> CliResult {
    let orchestrator = build_orchestrator(config, run_id)?;
    let cancel = cancel_on_ctrl_c();

    let outcome = match orchestrator.run_cycle(site_id, &cancel).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(site_id, error = %e, "Cycle could not start");
            return Err(e.into());
        }
    };

    output::print_cycle_outcome(&outcome);

    if outcome.is_success() {
        Ok(())
    } else {
        Err(format!("monitoring cycle for site {} failed", site_id).into())
    }
}

async fn handle_run_all(config: Config, run_id: Option<String>) -> CliResult {
    let orchestrator = Arc::new(build_orchestrator(config, run_id)?);
    let cancel = cancel_on_ctrl_c();

    let site_ids = {
        let storage = open_database(orchestrator.config())?;
        storage
            .list_enabled_sites()?
            .into_iter()
            .map(|site| site.id)
            .collect::<Vec<_>>()
    };

    if site_ids.is_empty() {
        println!("No enabled sites to monitor");
        return Ok(());
    }

    tracing::info!(sites = site_ids.len(), "Starting multi-site run");
    let reports = run_sites(orchestrator, site_ids, cancel).await;
    output::print_run_reports(&reports);

    let summary = RunSummary::from_reports(&reports);
    if summary.is_clean() {
        Ok(())
    } else {
        Err(format!(
            "{} of {} sites failed",
            summary.failed + summary.errored,
            summary.total()
        )
        .into())
    }
}

async fn handle_test_notify(config: &Config) -> CliResult {
    let notifier = build_notifier(config)?;
    if !notifier.is_enabled() {
        return Err("no webhook URL configured".into());
    }

    notifier.send_text(&message::test(Utc::now())).await?;
    println!("✓ Test notification delivered");
    Ok(())
}

async fn handle_report(config: &Config, outcome: WorkflowOutcome) -> CliResult {
    let notifier = build_notifier(config)?;
    if !notifier.is_enabled() {
        return Err("no webhook URL configured".into());
    }

    let context = WorkflowContext::from_env();
    notifier
        .send_text(&message::workflow_report(outcome, &context, Utc::now()))
        .await?;
    println!("✓ Workflow report delivered");
    Ok(())
}
