//! Deletes team invites nobody accepted within a week.

use crate::app_store::InviteStore;
use crate::background_jobs::{
    BackgroundJob, Cadence, JobAuditLogger, JobContext, JobError, ShutdownBehavior,
};
use crate::server::metrics;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

pub const INVITE_MAX_AGE_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Deletes every invite with `created_at < now - 7d` and returns how many
/// were removed. An invite exactly seven days old survives.
pub fn cleanup_expired_invites<S>(store: &S, now: DateTime<Utc>) -> Result<usize>
where
    S: InviteStore + ?Sized,
{
    let cutoff = now.timestamp_millis() - INVITE_MAX_AGE_MS;
    let mut deleted = 0;
    for invite in store.get_all_invites()? {
        if invite.created_at < cutoff && store.delete_invite(&invite.id)? {
            deleted += 1;
        }
    }
    if deleted > 0 {
        info!("Deleted {} expired invites", deleted);
    }
    Ok(deleted)
}

pub struct CleanupExpiredInvitesJob;

impl BackgroundJob for CleanupExpiredInvitesJob {
    fn id(&self) -> &'static str {
        "cleanup_expired_invites"
    }

    fn name(&self) -> &'static str {
        "Cleanup Expired Invites"
    }

    fn description(&self) -> &'static str {
        "Delete team invites older than 7 days"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily { hour: 3, minute: 0 }
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let audit = JobAuditLogger::new(Arc::clone(&ctx.server_store), self.id());
        audit.log_started(None);

        match cleanup_expired_invites(ctx.app_store.as_ref(), Utc::now()) {
            Ok(deleted) => {
                metrics::record_job_records_deleted(self.id(), deleted);
                audit.log_completed(Some(serde_json::json!({
                    "invites_deleted": deleted,
                })));
                Ok(())
            }
            Err(e) => {
                let error_msg = format!("Failed to clean up expired invites: {:#}", e);
                audit.log_failed(&error_msg, None);
                Err(JobError::ExecutionFailed(error_msg))
            }
        }
    }
}
