//! The maintenance jobs and the registry the binary schedules.

pub mod cleanup_expired_invites;
pub mod cleanup_stale_sessions;
pub mod reset_monthly_credits;
pub mod sync_subscriptions;

pub use cleanup_expired_invites::{cleanup_expired_invites, CleanupExpiredInvitesJob};
pub use cleanup_stale_sessions::{cleanup_stale_sessions, CleanupStaleSessionsJob};
pub use reset_monthly_credits::ResetMonthlyCreditsJob;
pub use sync_subscriptions::SyncSubscriptionsJob;

use super::BackgroundJob;
use std::sync::Arc;

/// Every maintenance job, in registration order.
pub fn maintenance_jobs() -> Vec<Arc<dyn BackgroundJob>> {
    vec![
        Arc::new(CleanupExpiredInvitesJob),
        Arc::new(ResetMonthlyCreditsJob),
        Arc::new(SyncSubscriptionsJob),
        Arc::new(CleanupStaleSessionsJob),
    ]
}
