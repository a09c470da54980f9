//! Deletes auth sessions that expired more than a day ago.

use crate::app_store::AuthSessionStore;
use crate::background_jobs::{BackgroundJob, Cadence, JobAuditLogger, JobContext, JobError};
use crate::server::metrics;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// Expired sessions are kept this long before they become eligible.
pub const SESSION_GRACE_MS: i64 = 24 * 60 * 60 * 1000;

/// Deletes every session with `expiration_time < now - 24h`. A session that
/// merely expired is left alone.
pub fn cleanup_stale_sessions<S>(store: &S, now: DateTime<Utc>) -> Result<usize>
where
    S: AuthSessionStore + ?Sized,
{
    let cutoff = now.timestamp_millis() - SESSION_GRACE_MS;
    let mut deleted = 0;
    for session in store.get_all_auth_sessions()? {
        if session.expiration_time < cutoff && store.delete_auth_session(&session.id)? {
            deleted += 1;
        }
    }
    if deleted > 0 {
        info!("Deleted {} stale auth sessions", deleted);
    }
    Ok(deleted)
}

pub struct CleanupStaleSessionsJob;

impl BackgroundJob for CleanupStaleSessionsJob {
    fn id(&self) -> &'static str {
        "cleanup_stale_sessions"
    }

    fn name(&self) -> &'static str {
        "Cleanup Stale Sessions"
    }

    fn description(&self) -> &'static str {
        "Delete auth sessions expired for more than 24 hours"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily { hour: 4, minute: 0 }
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let audit = JobAuditLogger::new(Arc::clone(&ctx.server_store), self.id());
        audit.log_started(None);

        let deleted = cleanup_stale_sessions(ctx.app_store.as_ref(), Utc::now()).map_err(|e| {
            let error_msg = format!("Failed to clean up stale sessions: {:#}", e);
            audit.log_failed(&error_msg, None);
            JobError::ExecutionFailed(error_msg)
        })?;

        metrics::record_job_records_deleted(self.id(), deleted);
        audit.log_completed(Some(serde_json::json!({
            "sessions_deleted": deleted,
        })));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_store::{AuthSession, SqliteAppStore};
    use crate::background_jobs::jobs::test_support::{test_context, FailingStore};
    use crate::server_store::{JobAuditEventType, ServerStore};
    use tempfile::TempDir;

    fn create_store() -> (SqliteAppStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteAppStore::new(temp_dir.path().join("app.db")).unwrap();
        (store, temp_dir)
    }

    fn session_expiring(store: &SqliteAppStore, expiration_time: i64) -> AuthSession {
        let session = AuthSession::new("user-1", expiration_time);
        store.insert_auth_session(&session).unwrap();
        session
    }

    #[test]
    fn test_recently_expired_sessions_survive() {
        let (store, _dir) = create_store();
        let now = Utc::now();
        let now_ms = now.timestamp_millis();

        let active = session_expiring(&store, now_ms + 60_000);
        let just_expired = session_expiring(&store, now_ms - 60_000);
        let at_cutoff = session_expiring(&store, now_ms - SESSION_GRACE_MS);
        session_expiring(&store, now_ms - SESSION_GRACE_MS - 1);
        session_expiring(&store, now_ms - 30 * SESSION_GRACE_MS);

        assert_eq!(cleanup_stale_sessions(&store, now).unwrap(), 2);

        let mut remaining: Vec<_> = store
            .get_all_auth_sessions()
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        remaining.sort();
        let mut expected = vec![active.id, just_expired.id, at_cutoff.id];
        expected.sort();
        assert_eq!(remaining, expected);
    }

    #[test]
    fn test_second_run_deletes_nothing() {
        let (store, _dir) = create_store();
        let now = Utc::now();
        session_expiring(&store, now.timestamp_millis() - 2 * SESSION_GRACE_MS);

        assert_eq!(cleanup_stale_sessions(&store, now).unwrap(), 1);
        assert_eq!(cleanup_stale_sessions(&store, now).unwrap(), 0);
    }

    #[test]
    fn test_store_failure_surfaces() {
        assert!(cleanup_stale_sessions(&FailingStore, Utc::now()).is_err());
    }

    #[test]
    fn test_job_failure_is_audited() {
        let (ctx, _app_store, server_store, _dir) = test_context();
        let failing_ctx = JobContext::new(
            ctx.cancellation_token.clone(),
            Arc::new(FailingStore),
            ctx.server_store.clone(),
        );

        let result = CleanupStaleSessionsJob.execute(&failing_ctx);
        assert!(matches!(result, Err(JobError::ExecutionFailed(msg)) if msg.contains("store unavailable")));

        let entries = server_store
            .get_job_audit_log_by_job("cleanup_stale_sessions", 10, 0)
            .unwrap();
        assert!(entries
            .iter()
            .any(|e| e.event_type == JobAuditEventType::Failed));
    }

    #[test]
    fn test_job_metadata() {
        let job = CleanupStaleSessionsJob;
        assert_eq!(job.id(), "cleanup_stale_sessions");
        assert_eq!(job.cadence(), Cadence::Daily { hour: 4, minute: 0 });
    }
}
