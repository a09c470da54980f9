use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use teamspace_server::app_store::{AppStore, ChangelogStore, SqliteAppStore};
use teamspace_server::background_jobs::{
    create_scheduler, maintenance_jobs, JobContext, SHUTDOWN_TIMEOUT,
};
use teamspace_server::changelog::ChangelogSubscriptions;
use teamspace_server::config;
use teamspace_server::rate_limit::RateLimiter;
use teamspace_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};
use teamspace_server::server_store::{ServerStore, SqliteServerStore};

const BUCKET_PRUNE_INTERVAL: Duration = Duration::from_secs(10 * 60);
const AUDIT_PRUNE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const SCHEDULER_STOP_TIMEOUT: Duration = Duration::from_secs(SHUTDOWN_TIMEOUT.as_secs() + 5);

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path_buf))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding app.db and server.db. Can also be set in the config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping). 0 disables it.
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Bearer token required by the admin API.
    #[clap(long)]
    pub admin_token: Option<String>,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level,
            admin_token: args.admin_token.clone(),
        }
    }
}

/// Drops buckets that have refilled, so one-off actors do not pile up.
fn spawn_bucket_pruning(rate_limiter: Arc<RateLimiter>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(BUCKET_PRUNE_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let pruned = rate_limiter.prune_full_buckets();
                    if pruned > 0 {
                        debug!("Pruned {} idle rate limit buckets", pruned);
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    });
}

fn spawn_audit_log_pruning(
    server_store: Arc<dyn ServerStore>,
    retention_days: u64,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(AUDIT_PRUNE_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cutoff_ms = Utc::now().timestamp_millis()
                        - (retention_days as i64) * 24 * 60 * 60 * 1000;
                    match server_store.cleanup_old_job_audit_entries(cutoff_ms) {
                        Ok(count) if count > 0 => {
                            info!("Pruned {} job audit entries older than {} days", count, retention_days);
                        }
                        Ok(_) => {}
                        Err(e) => error!("Failed to prune job audit log: {}", e),
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize tracing")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // TOML overrides CLI
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  port: {}", app_config.port);
    info!("  metrics_port: {}", app_config.metrics_port);
    info!(
        "  admin API: {}",
        if app_config.admin_token.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );

    metrics::init_metrics();

    let rate_limiter = Arc::new(
        RateLimiter::new(app_config.rate_limits.clone())
            .context("Invalid rate limit configuration")?,
    );
    for (name, policy) in rate_limiter.configured_policies() {
        info!(
            "Rate limit {}: capacity {}, +{} every {}ms",
            name, policy.capacity, policy.refill_amount, policy.refill_period_ms
        );
    }

    info!("Opening app store at {:?}", app_config.app_db_path());
    let app_store = Arc::new(SqliteAppStore::new(app_config.app_db_path())?);

    info!("Opening server store at {:?}", app_config.server_db_path());
    let server_store = Arc::new(SqliteServerStore::new(app_config.server_db_path())?);

    let shutdown_token = CancellationToken::new();

    // Jobs get their own root token: the scheduler cancels per-run children of
    // it for cancellable jobs and lets the others finish.
    let job_context = JobContext::new(
        CancellationToken::new(),
        app_store.clone() as Arc<dyn AppStore>,
        server_store.clone() as Arc<dyn ServerStore>,
    );
    let (mut scheduler, scheduler_handle) = create_scheduler(
        server_store.clone(),
        shutdown_token.clone(),
        job_context,
    );

    for job in maintenance_jobs() {
        if app_config.background_jobs.is_enabled(job.id()) {
            scheduler.register_job(job).await;
        } else {
            info!("Job {} disabled by configuration", job.id());
        }
    }
    info!(
        "Job scheduler initialized with {} job(s)",
        scheduler.job_count().await
    );

    spawn_bucket_pruning(rate_limiter.clone(), shutdown_token.clone());
    spawn_audit_log_pruning(
        server_store.clone(),
        app_config.background_jobs.audit_log_retention_days,
        shutdown_token.clone(),
    );

    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level,
        port: app_config.port,
        admin_token: app_config.admin_token.clone(),
    };
    let changelog = ChangelogSubscriptions::new(app_store.clone() as Arc<dyn ChangelogStore>);

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        signal_token.cancel();
    });

    let result = run_server(
        server_config,
        rate_limiter,
        changelog,
        Some(scheduler_handle),
        app_config.metrics_port,
        shutdown_token.clone(),
    )
    .await;
    info!("HTTP server stopped: {:?}", result);

    // The server may also stop on its own, e.g. a bind failure
    shutdown_token.cancel();
    if tokio::time::timeout(SCHEDULER_STOP_TIMEOUT, scheduler_task)
        .await
        .is_err()
    {
        error!("Scheduler did not stop within {:?}", SCHEDULER_STOP_TIMEOUT);
    }

    result
}
