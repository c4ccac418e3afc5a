use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::parser::CronError;
use super::schedule::CronSchedule;
use crate::pool::TaskPool;

/// Callback invoked when a job fires. Must be callable from any pool thread.
pub type JobCallback = Arc<dyn Fn() + Send + Sync>;

/// Failure modes of [`CronScheduler::add_job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddJobError {
    /// A job with the same id is already registered.
    DuplicateId,
    /// The cron expression failed to parse or has no satisfiable runtime.
    Expression(CronError),
}

impl fmt::Display for AddJobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddJobError::DuplicateId => f.write_str("a job with this id already exists"),
            AddJobError::Expression(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for AddJobError {}

struct CronJob {
    id: String,
    description: String,
    schedule: CronSchedule,
    callback: JobCallback,
    next_fire: DateTime<Utc>,
    enabled: bool,
}

/// Point-in-time copy of a registered job, as returned by
/// [`CronScheduler::list_jobs`].
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub description: String,
    pub expression: String,
    pub next_fire: DateTime<Utc>,
    pub enabled: bool,
}

/// A background scheduler that fires cron jobs onto a worker pool.
///
/// Jobs are keyed by id. A ticker thread scans the job map once per second
/// and submits every due, enabled callback to the embedded [`TaskPool`];
/// after each run (including a panicking one) the job's next fire time is
/// advanced to the first match strictly after the fire instant.
pub struct CronScheduler {
    jobs: Arc<Mutex<BTreeMap<String, CronJob>>>,
    running: Arc<AtomicBool>,
    pool: Arc<TaskPool>,
    ticker: Option<JoinHandle<()>>,
}

impl CronScheduler {
    /// Create a scheduler whose callbacks run on `workers` pool threads.
    /// Zero selects one worker per CPU.
    pub fn new(workers: usize) -> Self {
        CronScheduler {
            jobs: Arc::new(Mutex::new(BTreeMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            pool: Arc::new(TaskPool::new(workers)),
            ticker: None,
        }
    }

    /// Register a job. The initial fire time is computed from the current
    /// instant; the job starts enabled.
    ///
    /// # Errors
    ///
    /// [`AddJobError::DuplicateId`] when the id is taken,
    /// [`AddJobError::Expression`] when the cron expression is rejected.
    pub fn add_job(
        &self,
        id: &str,
        description: &str,
        expression: &str,
        callback: JobCallback,
    ) -> Result<(), AddJobError> {
        let schedule = CronSchedule::parse(expression).map_err(AddJobError::Expression)?;
        let next_fire = schedule
            .next_fire(Utc::now())
            .map_err(AddJobError::Expression)?;

        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(id) {
            return Err(AddJobError::DuplicateId);
        }

        info!(job_id = %id, expression = %expression, next_fire = %next_fire, "cron job added");
        jobs.insert(
            id.to_string(),
            CronJob {
                id: id.to_string(),
                description: description.to_string(),
                schedule,
                callback,
                next_fire,
                enabled: true,
            },
        );
        Ok(())
    }

    /// Remove a job. Returns whether it existed.
    pub fn remove_job(&self, id: &str) -> bool {
        let removed = self.jobs.lock().unwrap().remove(id).is_some();
        if removed {
            info!(job_id = %id, "cron job removed");
        }
        removed
    }

    /// Enable or disable a job. Returns whether it existed.
    pub fn set_job_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(id) {
            Some(job) => {
                job.enabled = enabled;
                info!(job_id = %id, enabled, "cron job toggled");
                true
            }
            None => false,
        }
    }

    /// Snapshot every registered job, ordered by id.
    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        self.jobs
            .lock()
            .unwrap()
            .values()
            .map(|job| JobSnapshot {
                id: job.id.clone(),
                description: job.description.clone(),
                expression: job.schedule.expression().to_string(),
                next_fire: job.next_fire,
                enabled: job.enabled,
            })
            .collect()
    }

    /// Start the ticker thread. Idempotent.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let jobs = self.jobs.clone();
        let running = self.running.clone();
        let pool = self.pool.clone();

        let handle = thread::Builder::new()
            .name("girder-cron-ticker".to_string())
            .spawn(move || {
                info!("cron ticker started");
                while running.load(Ordering::SeqCst) {
                    tick(&jobs, &pool);
                    thread::sleep(StdDuration::from_secs(1));
                }
                info!("cron ticker stopped");
            })
            .expect("failed to spawn cron ticker");
        self.ticker = Some(handle);
    }

    /// Stop the ticker and wait for in-flight callbacks to finish.
    /// Idempotent.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.ticker.take() {
            let _ = handle.join();
        }
        self.pool.wait_idle();
    }

    /// Whether the ticker is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One scheduler pass: collect due ids under the lock, then dispatch each
/// callback on the pool with the lock released.
fn tick(jobs: &Arc<Mutex<BTreeMap<String, CronJob>>>, pool: &TaskPool) {
    let now = Utc::now();
    let due: Vec<String> = {
        let jobs = jobs.lock().unwrap();
        jobs.values()
            .filter(|job| job.enabled && job.next_fire <= now)
            .map(|job| job.id.clone())
            .collect()
    };

    for job_id in due {
        let jobs = jobs.clone();
        pool.submit(move || run_job(&jobs, &job_id, now));
    }
}

fn run_job(jobs: &Mutex<BTreeMap<String, CronJob>>, job_id: &str, fired_at: DateTime<Utc>) {
    let callback = {
        let jobs = jobs.lock().unwrap();
        match jobs.get(job_id) {
            Some(job) => job.callback.clone(),
            // Removed between collection and dispatch.
            None => return,
        }
    };

    debug!(job_id = %job_id, "cron job firing");
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback())) {
        let message = crate::pool::panic_message(payload.as_ref());
        error!(job_id = %job_id, message = %message, "cron job callback panicked");
    }

    let mut jobs = jobs.lock().unwrap();
    if let Some(job) = jobs.get_mut(job_id) {
        match job.schedule.next_fire(fired_at + Duration::seconds(1)) {
            Ok(next) => job.next_fire = next,
            Err(err) => {
                // The expression has run out of runtimes; park the job
                // instead of re-firing it every tick.
                warn!(job_id = %job_id, error = %err, "cron job disabled");
                job.enabled = false;
            }
        }
    }
}
