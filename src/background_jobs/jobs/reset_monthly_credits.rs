//! Monthly AI credit reset.
//!
//! Reserved no-op. The job is registered on its monthly cadence so reset
//! logic can land here without touching the scheduler.

use crate::background_jobs::{BackgroundJob, Cadence, JobAuditLogger, JobContext, JobError};
use std::sync::Arc;
use tracing::debug;

pub struct ResetMonthlyCreditsJob;

impl BackgroundJob for ResetMonthlyCreditsJob {
    fn id(&self) -> &'static str {
        "reset_monthly_credits"
    }

    fn name(&self) -> &'static str {
        "Reset Monthly Credits"
    }

    fn description(&self) -> &'static str {
        "Reserved for monthly AI credit resets (currently no-op)"
    }

    fn cadence(&self) -> Cadence {
        Cadence::Monthly {
            day: 1,
            hour: 0,
            minute: 0,
        }
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let audit = JobAuditLogger::new(Arc::clone(&ctx.server_store), self.id());
        audit.log_started(None);
        debug!("Monthly credit reset has nothing to do");
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

        ResetMonthlyCreditsJob.execute(&ctx).unwrap();
        ResetMonthlyCreditsJob.execute(&ctx).unwrap();

        assert_eq!(snapshot(&app_store), before);
    }

    #[test]
    fn test_job_metadata() {
        let job = ResetMonthlyCreditsJob;
        assert_eq!(job.id(), "reset_monthly_credits");
        assert_eq!(job.cadence().kind(), "monthly");
    }
}
