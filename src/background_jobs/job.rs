use super::context::JobContext;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Timelike, Utc};
use std::fmt;
use std::time::Duration;

/// When a job fires. All times are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Every hour at `minute`.
    Hourly { minute: u32 },
    /// Every day at `hour:minute`.
    Daily { hour: u32, minute: u32 },
    /// Every month on `day` at `hour:minute`. Days past the end of a short
    /// month fire on that month's last day.
    Monthly { day: u32, hour: u32, minute: u32 },
}

impl Cadence {
    /// First firing instant strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.next_firing(now)
            .unwrap_or_else(|| now + ChronoDuration::seconds(self.period_hint().as_secs() as i64))
    }

    fn next_firing(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Cadence::Hourly { minute } => {
                let candidate = now
                    .date_naive()
                    .and_hms_opt(now.hour(), minute.min(59), 0)?
                    .and_utc();
                if candidate > now {
                    Some(candidate)
                } else {
                    Some(candidate + ChronoDuration::hours(1))
                }
            }
            Cadence::Daily { hour, minute } => {
                let candidate = now
                    .date_naive()
                    .and_hms_opt(hour.min(23), minute.min(59), 0)?
                    .and_utc();
                if candidate > now {
                    Some(candidate)
                } else {
                    Some(candidate + ChronoDuration::days(1))
                }
            }
            Cadence::Monthly { day, hour, minute } => {
                let (mut year, mut month) = (now.year(), now.month());
                // The current month or the next one always has a firing after `now`.
                for _ in 0..2 {
                    let last_day = last_day_of_month(year, month)?;
                    let candidate = Utc
                        .from_utc_datetime(
                            &NaiveDate::from_ymd_opt(year, month, day.clamp(1, last_day))?
                                .and_hms_opt(hour.min(23), minute.min(59), 0)?,
                        );
                    if candidate > now {
                        return Some(candidate);
                    }
                    (year, month) = if month == 12 {
                        (year + 1, 1)
                    } else {
                        (year, month + 1)
                    };
                }
                None
            }
        }
    }

    /// Nominal spacing between firings.
    pub fn period_hint(&self) -> Duration {
        match self {
            Cadence::Hourly { .. } => Duration::from_secs(60 * 60),
            Cadence::Daily { .. } => Duration::from_secs(24 * 60 * 60),
            Cadence::Monthly { .. } => Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Cadence::Hourly { .. } => "hourly",
            Cadence::Daily { .. } => "daily",
            Cadence::Monthly { .. } => "monthly",
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Some(NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?.day())
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Hourly { minute } => write!(f, "hourly at :{:02}", minute),
            Cadence::Daily { hour, minute } => {
                write!(f, "daily at {:02}:{:02} UTC", hour, minute)
            }
            Cadence::Monthly { day, hour, minute } => {
                write!(f, "monthly on day {} at {:02}:{:02} UTC", day, hour, minute)
            }
        }
    }
}

/// How a job should be handled during server shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownBehavior {
    /// Job can be cancelled immediately
    #[default]
    Cancellable,
    /// Wait for job to complete before shutdown
    WaitForCompletion,
}

#[derive(Debug)]
pub enum JobError {
    NotFound,
    AlreadyRunning,
    ExecutionFailed(String),
    Cancelled,
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::NotFound => write!(f, "Job not found"),
            JobError::AlreadyRunning => write!(f, "Job is already running"),
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            JobError::Cancelled => write!(f, "Job was cancelled"),
        }
    }
}

impl std::error::Error for JobError {}

/// A maintenance task the scheduler runs on a fixed cadence.
///
/// Jobs are executed synchronously on the blocking pool and must be
/// idempotent: a run that fails halfway is simply picked up by the next one.
pub trait BackgroundJob: Send + Sync {
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn cadence(&self) -> Cadence;

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    /// Called via `spawn_blocking`. Long loops should check
    /// `ctx.is_cancelled()` and return `JobError::Cancelled`.
    fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
