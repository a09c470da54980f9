//! Periodic maintenance jobs and the scheduler that runs them.
//!
//! Each job declares a UTC cadence; the scheduler keeps the next firing per
//! job in the server store so restarts neither skip nor repeat a firing.

mod audit_logger;
mod context;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use audit_logger::JobAuditLogger;
pub use context::JobContext;
pub use handle::{JobInfo, JobRunInfo, JobScheduleInfo, SchedulerHandle};
pub use job::{BackgroundJob, Cadence, JobError, ShutdownBehavior};
pub use jobs::maintenance_jobs;
pub use scheduler::{create_scheduler, JobScheduler, SHUTDOWN_TIMEOUT};
