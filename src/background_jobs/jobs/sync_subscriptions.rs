//! Hourly billing subscription sync. The billing provider pushes changes
//! through webhooks today, so the periodic pass is a registered no-op.

use crate::background_jobs::{BackgroundJob, Cadence, JobAuditLogger, JobContext, JobError};
use std::sync::Arc;
use tracing::debug;

pub struct SyncSubscriptionsJob;

impl BackgroundJob for SyncSubscriptionsJob {
    fn id(&self) -> &'static str {
        "sync_subscriptions"
    }

    fn name(&self) -> &'static str {
        "Sync Subscriptions"
    }

    fn description(&self) -> &'static str {
        "Reserved for reconciling billing subscriptions (currently no-op)"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Hourly { minute: 15 }
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let audit = JobAuditLogger::new(Arc::clone(&ctx.server_store), self.id());
        audit.log_started(None);
        debug!("Subscription sync has nothing to do");
        audit.log_completed(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::jobs::test_support::{seed_stale_records, snapshot, test_context};

    #[test]
    fn test_runs_without_touching_records() {
        let (ctx, app_store, _server_store, _dir) = test_context();
        seed_stale_records(&app_store);
        let before = snapshot(&app_store);

        SyncSubscriptionsJob.execute(&ctx).unwrap();

        assert_eq!(snapshot(&app_store), before);
    }

    #[test]
    fn test_job_metadata() {
        assert_eq!(
            SyncSubscriptionsJob.cadence(),
            Cadence::Hourly { minute: 15 }
        );
    }
}
