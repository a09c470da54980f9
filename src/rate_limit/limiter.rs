use super::policy::{default_policies, RateLimitPolicy};
use crate::server::metrics;
use governor::clock::{Clock, DefaultClock, Reference};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::Quota;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("unknown rate limit policy '{0}'")]
    UnknownPolicy(String),
    #[error("rate limit policy '{0}' is defined more than once")]
    DuplicatePolicy(String),
    #[error("invalid rate limit policy '{name}': {reason}")]
    InvalidPolicy { name: String, reason: &'static str },
}

/// Outcome of a `limit` or `check` call. A denial is a normal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl RateLimitStatus {
    fn allowed() -> Self {
        Self {
            ok: true,
            retry_after_ms: None,
        }
    }

    fn denied(retry_after: Duration) -> Self {
        Self {
            ok: false,
            retry_after_ms: Some((retry_after.as_millis() as u64).max(1)),
        }
    }
}

type KeyedLimiter<C> = governor::RateLimiter<
    String,
    DefaultKeyedStateStore<String>,
    C,
    NoOpMiddleware<<C as Clock>::Instant>,
>;

/// One governor limiter per policy, keyed by actor.
struct PolicyLimiter<C: Clock> {
    /// Time between two refilled tokens.
    emission_interval: Duration,
    capacity: u32,
    limiter: KeyedLimiter<C>,
    /// Theoretical arrival time of each actor's next token, as an offset from
    /// the limiter's start. Only feeds `check`, which must not consume.
    arrivals: Mutex<HashMap<String, Duration>>,
}

impl<C: Clock> PolicyLimiter<C> {
    fn new(policy: &RateLimitPolicy, clock: C) -> Option<Self> {
        let emission_interval = policy.emission_interval();
        let quota =
            Quota::with_period(emission_interval)?.allow_burst(NonZeroU32::new(policy.capacity)?);
        Some(Self {
            emission_interval,
            capacity: policy.capacity,
            limiter: governor::RateLimiter::dashmap_with_clock(quota, clock),
            arrivals: Mutex::new(HashMap::new()),
        })
    }

    fn arrivals(&self) -> MutexGuard<'_, HashMap<String, Duration>> {
        // Entries are plain offsets, a poisoned lock still holds valid ones.
        self.arrivals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_consumed(&self, actor: String, now: Duration) {
        let mut arrivals = self.arrivals();
        let arrival = arrivals.entry(actor).or_insert(now);
        *arrival = (*arrival).max(now) + self.emission_interval;
    }

    /// Evaluates the bucket the way governor would, without touching it.
    fn peek(&self, actor: &str, now: Duration) -> RateLimitStatus {
        let arrival = self.arrivals().get(actor).copied().unwrap_or(now);
        let burst_tolerance = self.emission_interval * (self.capacity - 1);
        let earliest = arrival.saturating_sub(burst_tolerance);
        if now >= earliest {
            RateLimitStatus::allowed()
        } else {
            RateLimitStatus::denied(earliest - now)
        }
    }

    fn prune(&self, now: Duration) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.arrivals().retain(|_, arrival| *arrival > now);
        before.saturating_sub(self.limiter.len())
    }
}

/// Token-bucket limiter keyed by (policy name, actor).
///
/// The policy table is fixed at construction. Each policy gets a keyed
/// governor limiter: burst is the capacity and one token comes back every
/// `refill_period / refill_amount`. Consumption is atomic per key inside
/// governor.
pub struct RateLimiter<C: Clock = DefaultClock> {
    policies: BTreeMap<String, RateLimitPolicy>,
    limiters: HashMap<String, PolicyLimiter<C>>,
    clock: C,
    start: C::Instant,
}

impl RateLimiter {
    pub fn new(
        policies: impl IntoIterator<Item = (String, RateLimitPolicy)>,
    ) -> Result<Self, RateLimitError> {
        Self::with_clock(policies, DefaultClock::default())
    }

    pub fn with_default_policies() -> Self {
        let clock = DefaultClock::default();
        let policies: BTreeMap<String, RateLimitPolicy> = default_policies().into_iter().collect();
        let limiters = policies
            .iter()
            .filter_map(|(name, policy)| {
                Some((name.clone(), PolicyLimiter::new(policy, clock.clone())?))
            })
            .collect();
        let start = clock.now();
        Self {
            policies,
            limiters,
            clock,
            start,
        }
    }
}

impl<C: Clock + Clone> RateLimiter<C> {
    /// Builds a limiter that reads time from `clock`.
    pub fn with_clock(
        policies: impl IntoIterator<Item = (String, RateLimitPolicy)>,
        clock: C,
    ) -> Result<Self, RateLimitError> {
        let mut table = BTreeMap::new();
        let mut limiters = HashMap::new();
        for (name, policy) in policies {
            validate_policy(&name, &policy)?;
            if table.contains_key(&name) {
                return Err(RateLimitError::DuplicatePolicy(name));
            }
            let limiter = PolicyLimiter::new(&policy, clock.clone()).ok_or_else(|| {
                RateLimitError::InvalidPolicy {
                    name: name.clone(),
                    reason: "refill amount must not exceed refill period in nanoseconds",
                }
            })?;
            limiters.insert(name.clone(), limiter);
            table.insert(name, policy);
        }
        let start = clock.now();
        Ok(Self {
            policies: table,
            limiters,
            clock,
            start,
        })
    }

    pub fn configured_policies(&self) -> &BTreeMap<String, RateLimitPolicy> {
        &self.policies
    }

    fn policy_limiter(&self, name: &str) -> Result<&PolicyLimiter<C>, RateLimitError> {
        self.limiters
            .get(name)
            .ok_or_else(|| RateLimitError::UnknownPolicy(name.to_string()))
    }

    fn elapsed(&self) -> Duration {
        self.clock.now().duration_since(self.start).into()
    }

    /// Consumes one token from `actor`'s bucket for `policy`.
    pub fn limit(
        &self,
        policy_name: &str,
        actor: &str,
    ) -> Result<RateLimitStatus, RateLimitError> {
        let policy = self.policy_limiter(policy_name)?;
        let key = actor.to_string();
        match policy.limiter.check_key(&key) {
            Ok(_) => {
                policy.record_consumed(key, self.elapsed());
                Ok(RateLimitStatus::allowed())
            }
            Err(not_until) => {
                let status = RateLimitStatus::denied(not_until.wait_time_from(self.clock.now()));
                debug!(
                    "Rate limit hit for policy {} by actor {} (retry in {:?}ms)",
                    policy_name, actor, status.retry_after_ms
                );
                metrics::record_rate_limit_hit(policy_name);
                Ok(status)
            }
        }
    }

    /// Same evaluation as [`RateLimiter::limit`] without consuming a token or
    /// creating a bucket.
    pub fn check(
        &self,
        policy_name: &str,
        actor: &str,
    ) -> Result<RateLimitStatus, RateLimitError> {
        let policy = self.policy_limiter(policy_name)?;
        Ok(policy.peek(actor, self.elapsed()))
    }

    /// Drops buckets that have refilled to capacity; a full bucket behaves
    /// exactly like a missing one. Returns how many were dropped.
    pub fn prune_full_buckets(&self) -> usize {
        let now = self.elapsed();
        self.limiters.values().map(|policy| policy.prune(now)).sum()
    }

    pub fn tracked_buckets(&self) -> usize {
        self.limiters.values().map(|policy| policy.limiter.len()).sum()
    }
}

fn validate_policy(name: &str, policy: &RateLimitPolicy) -> Result<(), RateLimitError> {
    let reason = if name.is_empty() {
        Some("name must not be empty")
    } else if policy.capacity == 0 {
        Some("capacity must be at least 1")
    } else if policy.refill_amount == 0 {
        Some("refill amount must be at least 1")
    } else if policy.refill_period_ms == 0 {
        Some("refill period must be at least 1ms")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(RateLimitError::InvalidPolicy {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
