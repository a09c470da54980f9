//! Named token-bucket policies guarding sensitive mutations.
//!
//! Callers ask [`RateLimiter::limit`] before performing an action and
//! [`RateLimiter::check`] for read-only probes that must not burn quota.
//!
//! The operations these policies guard (sending invites, AI requests, login
//! attempts) are served outside this crate and call `limit` there. This server
//! owns the policy table and exposes `check` over HTTP.

mod limiter;
mod policy;

pub use limiter::{RateLimitError, RateLimitStatus, RateLimiter};
pub use policy::{
    default_policies, BucketKind, RateLimitPolicy, AI_REQUEST, FAILED_LOGIN, RATE_LIMITS,
    SEND_INVITE,
};
