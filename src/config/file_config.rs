use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub admin_token: Option<String>,

    // Feature configs
    pub background_jobs: Option<BackgroundJobsConfig>,
    /// Keyed by policy name, e.g. `[rate_limits.sendInvite]`.
    pub rate_limits: Option<BTreeMap<String, RateLimitConfig>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackgroundJobsConfig {
    /// Job ids that are not registered with the scheduler.
    pub disabled: Option<Vec<String>>,
    pub audit_log_retention_days: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub capacity: Option<u32>,
    pub refill_period_ms: Option<u64>,
    pub refill_amount: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
