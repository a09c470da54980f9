mod file_config;

pub use file_config::{BackgroundJobsConfig, FileConfig, RateLimitConfig};

use crate::rate_limit::{default_policies, RateLimitPolicy};
use crate::server::RequestsLoggingLevel;
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

pub const DEFAULT_AUDIT_LOG_RETENTION_DAYS: u64 = 30;

/// CLI arguments that can be overridden by the TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    /// Admin routes answer 503 while this is unset.
    pub admin_token: Option<String>,
    pub background_jobs: BackgroundJobsSettings,
    /// Default policies merged with `[rate_limits]` overrides.
    pub rate_limits: Vec<(String, RateLimitPolicy)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundJobsSettings {
    pub disabled: BTreeSet<String>,
    pub audit_log_retention_days: u64,
}

impl Default for BackgroundJobsSettings {
    fn default() -> Self {
        Self {
            disabled: BTreeSet::new(),
            audit_log_retention_days: DEFAULT_AUDIT_LOG_RETENTION_DAYS,
        }
    }
}

impl BackgroundJobsSettings {
    pub fn is_enabled(&self, job_id: &str) -> bool {
        !self.disabled.contains(job_id)
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| anyhow!("db_dir must be specified via --db-dir or in config file"))?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        if port != 0 && port == metrics_port {
            bail!("port and metrics_port must differ (both are {})", port);
        }

        let logging_level = match file.logging_level {
            Some(s) => parse_logging_level(&s)
                .ok_or_else(|| anyhow!("Invalid logging_level in config file: {:?}", s))?,
            None => cli.logging_level.clone(),
        };

        let admin_token = file
            .admin_token
            .or_else(|| cli.admin_token.clone())
            .filter(|token| !token.trim().is_empty());

        let jobs_file = file.background_jobs.unwrap_or_default();
        let background_jobs = BackgroundJobsSettings {
            disabled: jobs_file.disabled.unwrap_or_default().into_iter().collect(),
            audit_log_retention_days: jobs_file
                .audit_log_retention_days
                .unwrap_or(DEFAULT_AUDIT_LOG_RETENTION_DAYS),
        };

        let rate_limits = resolve_rate_limits(file.rate_limits.unwrap_or_default())?;

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            admin_token,
            background_jobs,
            rate_limits,
        })
    }

    pub fn app_db_path(&self) -> PathBuf {
        self.db_dir.join("app.db")
    }

    pub fn server_db_path(&self) -> PathBuf {
        self.db_dir.join("server.db")
    }
}

/// Applies per-field overrides to the default policy table. Names that are
/// not defaults add a new policy and must set every field. Value checks are
/// left to `RateLimiter::new`.
fn resolve_rate_limits(
    overrides: BTreeMap<String, RateLimitConfig>,
) -> Result<Vec<(String, RateLimitPolicy)>> {
    let mut policies = default_policies();

    for (name, config) in overrides {
        if let Some((_, policy)) = policies.iter_mut().find(|(n, _)| *n == name) {
            if let Some(capacity) = config.capacity {
                policy.capacity = capacity;
            }
            if let Some(refill_period_ms) = config.refill_period_ms {
                policy.refill_period_ms = refill_period_ms;
            }
            if let Some(refill_amount) = config.refill_amount {
                policy.refill_amount = refill_amount;
            }
            continue;
        }

        match (config.capacity, config.refill_period_ms, config.refill_amount) {
            (Some(capacity), Some(refill_period_ms), Some(refill_amount)) => {
                policies.push((
                    name,
                    RateLimitPolicy::token_bucket(capacity, refill_amount, refill_period_ms),
                ));
            }
            _ => bail!(
                "Rate limit policy {:?} is not a default policy, so capacity, \
                 refill_period_ms and refill_amount are all required",
                name
            ),
        }
    }

    Ok(policies)
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
