use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SEND_INVITE: &str = "sendInvite";
pub const AI_REQUEST: &str = "aiRequest";
pub const FAILED_LOGIN: &str = "failedLogin";

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketKind {
    #[serde(rename = "token bucket")]
    TokenBucket,
}

/// Static token-bucket parameters for one named operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub kind: BucketKind,
    pub capacity: u32,
    pub refill_period_ms: u64,
    pub refill_amount: u32,
}

impl RateLimitPolicy {
    pub const fn token_bucket(capacity: u32, refill_amount: u32, refill_period_ms: u64) -> Self {
        Self {
            kind: BucketKind::TokenBucket,
            capacity,
            refill_period_ms,
            refill_amount,
        }
    }

    pub fn refill_period(&self) -> Duration {
        Duration::from_millis(self.refill_period_ms)
    }

    /// Time for one token to come back: `refill_period / refill_amount`.
    pub fn emission_interval(&self) -> Duration {
        self.refill_period() / self.refill_amount.max(1)
    }
}

/// Policies every deployment starts with. Config can add names or override
/// these parameters, never remove them.
pub const RATE_LIMITS: &[(&str, RateLimitPolicy)] = &[
    (SEND_INVITE, RateLimitPolicy::token_bucket(5, 10, MINUTE_MS)),
    (AI_REQUEST, RateLimitPolicy::token_bucket(5, 20, MINUTE_MS)),
    (FAILED_LOGIN, RateLimitPolicy::token_bucket(5, 5, HOUR_MS)),
];

pub fn default_policies() -> Vec<(String, RateLimitPolicy)> {
    RATE_LIMITS
        .iter()
        .map(|(name, policy)| (name.to_string(), policy.clone()))
        .collect()
}
