use axum::extract::FromRef;

use crate::background_jobs::SchedulerHandle;
use crate::changelog::ChangelogSubscriptions;
use crate::rate_limit::RateLimiter;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedRateLimiter = Arc<RateLimiter>;
pub type OptionalSchedulerHandle = Option<SchedulerHandle>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub hash: String,
    pub rate_limiter: GuardedRateLimiter,
    pub changelog: ChangelogSubscriptions,
    pub scheduler_handle: OptionalSchedulerHandle,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedRateLimiter {
    fn from_ref(input: &ServerState) -> Self {
        input.rate_limiter.clone()
    }
}

impl FromRef<ServerState> for ChangelogSubscriptions {
    fn from_ref(input: &ServerState) -> Self {
        input.changelog.clone()
    }
}

impl FromRef<ServerState> for OptionalSchedulerHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler_handle.clone()
    }
}
