use super::context::JobContext;
use super::handle::{SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, JobError, ShutdownBehavior};
use crate::server::metrics;
use crate::server_store::{JobRunStatus, JobScheduleState, ServerStore};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound on one scheduler sleep, so clock jumps are noticed.
const MAX_SLEEP: Duration = Duration::from_secs(60);
/// Total time shutdown waits for running jobs, shared by all of them.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub const TRIGGER_SCHEDULE: &str = "schedule";
pub const TRIGGER_MANUAL: &str = "manual";

/// Runs registered jobs on their cadences, one run per job at a time.
pub struct JobScheduler {
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Task handles of running jobs, owned by the scheduler loop.
    running_handles: HashMap<String, JoinHandle<()>>,

    job_cancel_tokens: HashMap<String, CancellationToken>,

    /// Next firing per job. Persisted to the server store, but the loop
    /// trusts this copy so a failing store cannot make it spin.
    next_runs: HashMap<String, DateTime<Utc>>,

    server_store: Arc<dyn ServerStore>,

    command_receiver: mpsc::Receiver<SchedulerCommand>,

    shutdown_token: CancellationToken,

    job_context: JobContext,

    shutdown_timeout: Duration,
}

impl JobScheduler {
    pub fn new(
        server_store: Arc<dyn ServerStore>,
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            shared_state,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            next_runs: HashMap::new(),
            server_store,
            command_receiver,
            shutdown_token,
            job_context,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }

    pub fn set_shutdown_timeout(&mut self, timeout: Duration) {
        self.shutdown_timeout = timeout;
    }

    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!(
            "Registering job: {} - {} ({})",
            job_id,
            job.description(),
            job.cadence()
        );
        let mut state = self.shared_state.write().await;
        state.jobs.insert(job_id, job);
    }

    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        match self.server_store.get_running_jobs() {
            Ok(stale_runs) => {
                for run in &stale_runs {
                    warn!(
                        "Job {} run {} (started {}) did not finish before the last stop",
                        run.job_id, run.id, run.started_at
                    );
                }
            }
            Err(e) => {
                error!("Failed to list unfinished job runs: {}", e);
            }
        }

        match self.server_store.mark_stale_jobs_failed() {
            Ok(count) if count > 0 => {
                info!("Marked {} stale jobs as failed from previous run", count);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to mark stale jobs: {}", e);
            }
        }

        self.load_schedules().await;

        loop {
            self.cleanup_completed_jobs();

            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    /// Picks up persisted next-run times. Jobs seen for the first time are
    /// scheduled for their next cadence instant rather than run immediately;
    /// jobs whose persisted time passed while the process was down run once.
    async fn load_schedules(&mut self) {
        let now = Utc::now();
        let jobs: Vec<_> = {
            let state = self.shared_state.read().await;
            state.jobs.values().cloned().collect()
        };

        for job in jobs {
            let job_id = job.id();
            let next_run = match self.server_store.get_schedule_state(job_id) {
                Ok(Some(state)) => state.next_run_at,
                Ok(None) => {
                    let next_run = job.cadence().next_after(now);
                    self.persist_schedule(job_id, next_run, None);
                    next_run
                }
                Err(e) => {
                    warn!("Failed to load schedule state for {}: {}", job_id, e);
                    job.cadence().next_after(now)
                }
            };
            info!("Job {} next run at {}", job_id, next_run.to_rfc3339());
            self.next_runs.insert(job_id.to_string(), next_run);
        }
    }

    fn persist_schedule(
        &self,
        job_id: &str,
        next_run_at: DateTime<Utc>,
        last_run_at: Option<DateTime<Utc>>,
    ) {
        let state = JobScheduleState {
            job_id: job_id.to_string(),
            next_run_at,
            last_run_at,
        };
        if let Err(e) = self.server_store.update_schedule_state(&state) {
            warn!("Failed to persist schedule state for {}: {}", job_id, e);
        }
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        {
            let state = self.shared_state.read().await;
            if !state.jobs.contains_key(job_id) {
                return Err(JobError::NotFound);
            }
            if state.running_jobs.contains(job_id) {
                return Err(JobError::AlreadyRunning);
            }
        }

        self.spawn_job(job_id, TRIGGER_MANUAL).await
    }

    async fn time_until_next_scheduled_job(&self) -> Duration {
        let now = Utc::now();
        let state = self.shared_state.read().await;

        let mut min_duration = MAX_SLEEP;
        for (job_id, next_run) in &self.next_runs {
            if state.running_jobs.contains(job_id) {
                continue;
            }
            if *next_run <= now {
                return Duration::ZERO;
            }
            let duration = (*next_run - now).to_std().unwrap_or(Duration::from_secs(1));
            min_duration = min_duration.min(duration);
        }
        min_duration
    }

    async fn run_due_jobs(&mut self) {
        let now = Utc::now();
        let due: Vec<String> = {
            let state = self.shared_state.read().await;
            self.next_runs
                .iter()
                .filter(|(job_id, next_run)| {
                    **next_run <= now && !state.running_jobs.contains(*job_id)
                })
                .map(|(job_id, _)| job_id.clone())
                .collect()
        };

        for job_id in due {
            if let Err(e) = self.spawn_job(&job_id, TRIGGER_SCHEDULE).await {
                error!("Failed to start scheduled job {}: {}", job_id, e);
            }
        }
    }

    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str) -> Result<(), JobError> {
        let job = {
            let state = self.shared_state.read().await;
            state.jobs.get(job_id).cloned().ok_or(JobError::NotFound)?
        };

        // Advance before running: a failed run waits for the next cadence
        // instant instead of being retried in a loop.
        if triggered_by == TRIGGER_SCHEDULE {
            let next_run = job.cadence().next_after(Utc::now());
            self.next_runs.insert(job_id.to_string(), next_run);
            let last_run = self
                .server_store
                .get_schedule_state(job_id)
                .ok()
                .flatten()
                .and_then(|s| s.last_run_at);
            self.persist_schedule(job_id, next_run, last_run);
        }

        let run_id = self
            .server_store
            .record_job_start(job_id, triggered_by)
            .map_err(|e| {
                error!("Failed to record job start for {}: {}", job_id, e);
                JobError::ExecutionFailed(format!("Failed to record job start: {}", e))
            })?;

        info!(
            "Starting job: {} (run_id: {}, triggered_by: {})",
            job_id, run_id, triggered_by
        );

        {
            let mut state = self.shared_state.write().await;
            state.running_jobs.insert(job_id.to_string());
        }
        metrics::set_background_job_running(job_id, true);

        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());
        let ctx = self.job_context.with_token(cancel_token);

        let server_store = Arc::clone(&self.server_store);
        let shared_state = Arc::clone(&self.shared_state);
        let job_id_owned = job_id.to_string();

        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let result = tokio::task::spawn_blocking(move || job.execute(&ctx)).await;
            let elapsed = start_time.elapsed();

            let (status, error_msg, status_label) = match result {
                Ok(Ok(())) => {
                    info!(
                        "Job {} completed successfully in {:?}",
                        job_id_owned, elapsed
                    );
                    (JobRunStatus::Completed, None, "success")
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    (
                        JobRunStatus::Failed,
                        Some("Cancelled".to_string()),
                        "cancelled",
                    )
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    (JobRunStatus::Failed, Some(e.to_string()), "failed")
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    (
                        JobRunStatus::Failed,
                        Some(format!("Task panic: {}", e)),
                        "panic",
                    )
                }
            };

            metrics::record_background_job_execution(&job_id_owned, status_label, elapsed);
            metrics::set_background_job_running(&job_id_owned, false);

            if let Err(e) = server_store.record_job_finish(run_id, status, error_msg) {
                error!("Failed to record job finish for {}: {}", job_id_owned, e);
            }
            record_last_run(server_store.as_ref(), &job_id_owned);

            shared_state.write().await.running_jobs.remove(&job_id_owned);
        });

        self.running_handles.insert(job_id.to_string(), handle);
        Ok(())
    }

    fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            self.running_handles.remove(&job_id);
            self.job_cancel_tokens.remove(&job_id);
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        let mut wait_jobs = Vec::new();
        {
            let state = self.shared_state.read().await;
            for (job_id, handle) in self.running_handles.drain() {
                let behavior = state
                    .jobs
                    .get(&job_id)
                    .map(|j| j.shutdown_behavior())
                    .unwrap_or_default();
                if behavior == ShutdownBehavior::Cancellable {
                    if let Some(token) = self.job_cancel_tokens.get(&job_id) {
                        debug!("Cancelling job: {}", job_id);
                        token.cancel();
                    }
                } else {
                    info!("Waiting for job {} to complete...", job_id);
                }
                wait_jobs.push((job_id, handle));
            }
        }

        // Jobs keep running in parallel, so one deadline bounds the whole wait.
        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        for (job_id, handle) in wait_jobs {
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                warn!(
                    "Job {} did not stop within {:?}",
                    job_id, self.shutdown_timeout
                );
            }
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

/// Stamps `last_run_at`, keeping whatever next-run time is stored.
fn record_last_run(server_store: &dyn ServerStore, job_id: &str) {
    let now = Utc::now();
    let state = match server_store.get_schedule_state(job_id) {
        Ok(Some(state)) => JobScheduleState {
            last_run_at: Some(now),
            ..state
        },
        Ok(None) => return,
        Err(e) => {
            warn!("Failed to read schedule state for {}: {}", job_id, e);
            return;
        }
    };
    if let Err(e) = server_store.update_schedule_state(&state) {
        warn!("Failed to record last run for {}: {}", job_id, e);
    }
}

/// Builds a scheduler and the handle HTTP handlers use to talk to it.
pub fn create_scheduler(
    server_store: Arc<dyn ServerStore>,
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState {
        jobs: HashMap::new(),
        running_jobs: HashSet::new(),
    }));

    let scheduler = JobScheduler::new(
        Arc::clone(&server_store),
        command_rx,
        shutdown_token,
        job_context,
        Arc::clone(&shared_state),
    );
    let handle = SchedulerHandle::new(command_tx, shared_state, server_store);

    (scheduler, handle)
}
