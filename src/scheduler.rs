/// In-process job scheduler.
///
/// Owns two periodic jobs (slow full cycle, fast measurement sweep) and one
/// one-shot fast run shortly after start. A ticker thread wakes every `tick`
/// and hands due jobs to a fixed-size worker pool under this policy:
///   - coalesce: a backlog of missed triggers becomes at most one run
///   - one instance: a job still in flight skips its next trigger
///   - misfire grace: a trigger later than the grace period is skipped
///
/// Lifecycle is `new -> ensure_started -> stop`; `ensure_started` is a
/// no-op while running. Every job run is wrapped so that errors and panics
/// are logged and never reach the pool.

use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use threadpool::ThreadPool;

use crate::config::EtlConfig;
use crate::store::StoreError;

pub const SLOW_JOB_ID: &str = "data_collection_job";
pub const FAST_JOB_ID: &str = "fast_measurements_job";
pub const INITIAL_FAST_JOB_ID: &str = "fast_measurements_initial";

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Failed(String),
}

/// A unit of scheduled work.
pub type Task = Arc<dyn Fn() -> Result<(), JobError> + Send + Sync>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub slow_interval: Duration,
    pub fast_interval: Duration,
    /// Delay of the one-shot fast run after start.
    pub initial_fast_delay: Duration,
    pub misfire_grace: Duration,
    pub workers: usize,
    /// How often the ticker checks for due jobs.
    pub tick: Duration,
}

impl SchedulerConfig {
    pub fn from_config(config: &EtlConfig) -> Self {
        Self {
            slow_interval: Duration::from_secs(config.slow_interval_secs),
            fast_interval: Duration::from_secs(config.fast_interval_secs),
            initial_fast_delay: Duration::from_secs(config.initial_fast_delay_secs),
            misfire_grace: Duration::from_secs(config.misfire_grace_secs),
            workers: config.workers,
            tick: Duration::from_millis(250),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_config(&EtlConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Stopped => "stopped",
            SchedulerState::Running => "running",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Trigger {
    Every(Duration),
    Once,
}

struct Job {
    id: &'static str,
    trigger: Trigger,
    next_run: Instant,
    task: Task,
    /// Shared by every job that runs the same task.
    in_flight: Arc<AtomicBool>,
}

/// First fire time strictly after `now` on the grid `scheduled + k * interval`.
pub(crate) fn next_fire(scheduled: Instant, interval: Duration, now: Instant) -> Instant {
    if interval.is_zero() {
        return now;
    }
    let elapsed = now.saturating_duration_since(scheduled).as_nanos();
    let step = interval.as_nanos();
    let periods = elapsed / step + 1;
    let offset = u64::try_from(step * periods).unwrap_or(u64::MAX);
    scheduled + Duration::from_nanos(offset)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs a task, logging its result. Never unwinds.
fn run_guarded(id: &str, task: &Task) {
    let started = Instant::now();
    debug!("job {} started", id);
    match panic::catch_unwind(AssertUnwindSafe(|| task())) {
        Ok(Ok(())) => debug!("job {} finished in {:.1?}", id, started.elapsed()),
        Ok(Err(e)) => error!("job {} failed: {}", id, e),
        Err(payload) => error!("job {} panicked: {}", id, panic_message(payload.as_ref())),
    }
}

/// Dispatches every due job and reschedules or drops it.
fn dispatch_due(jobs: &mut Vec<Job>, pool: &ThreadPool, grace: Duration, now: Instant) {
    jobs.retain_mut(|job| {
        if job.next_run > now {
            return true;
        }

        let lateness = now.saturating_duration_since(job.next_run);
        let keep = match job.trigger {
            Trigger::Every(interval) => {
                job.next_run = next_fire(job.next_run, interval, now);
                true
            }
            Trigger::Once => false,
        };

        if lateness > grace {
            warn!("job {} missed its run by {:.1?}, skipping", job.id, lateness);
            return keep;
        }
        if job.in_flight.swap(true, Ordering::SeqCst) {
            warn!("job {} is still running, skipping this run", job.id);
            return keep;
        }

        let id = job.id;
        let task = Arc::clone(&job.task);
        let in_flight = Arc::clone(&job.in_flight);
        pool.execute(move || {
            run_guarded(id, &task);
            in_flight.store(false, Ordering::SeqCst);
        });
        keep
    });
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Shared {
    jobs: Mutex<Vec<Job>>,
    shutdown: Mutex<bool>,
    wake: Condvar,
}

struct Runtime {
    ticker: JoinHandle<()>,
    pool: ThreadPool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Scheduler {
    config: SchedulerConfig,
    slow: Task,
    fast: Task,
    slow_in_flight: Arc<AtomicBool>,
    fast_in_flight: Arc<AtomicBool>,
    shared: Arc<Shared>,
    /// `Some` while running.
    runtime: Mutex<Option<Runtime>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, slow: Task, fast: Task) -> Self {
        Self {
            config,
            slow,
            fast,
            slow_in_flight: Arc::new(AtomicBool::new(false)),
            fast_in_flight: Arc::new(AtomicBool::new(false)),
            shared: Arc::new(Shared {
                jobs: Mutex::new(Vec::new()),
                shutdown: Mutex::new(false),
                wake: Condvar::new(),
            }),
            runtime: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if lock(&self.runtime).is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// Ids of the currently registered jobs.
    pub fn job_ids(&self) -> Vec<&'static str> {
        lock(&self.shared.jobs).iter().map(|j| j.id).collect()
    }

    /// Starts the scheduler unless it is already running.
    ///
    /// Runs one full cycle synchronously first, then registers the periodic
    /// jobs and the one-shot fast run. Returns whether this call started it.
    pub fn ensure_started(&self) -> bool {
        let mut runtime = lock(&self.runtime);
        if runtime.is_some() {
            info!("scheduler already running");
            return false;
        }

        self.slow_in_flight.store(true, Ordering::SeqCst);
        run_guarded(SLOW_JOB_ID, &self.slow);
        self.slow_in_flight.store(false, Ordering::SeqCst);

        let now = Instant::now();
        *lock(&self.shared.jobs) = vec![
            Job {
                id: SLOW_JOB_ID,
                trigger: Trigger::Every(self.config.slow_interval),
                next_run: now + self.config.slow_interval,
                task: Arc::clone(&self.slow),
                in_flight: Arc::clone(&self.slow_in_flight),
            },
            Job {
                id: FAST_JOB_ID,
                trigger: Trigger::Every(self.config.fast_interval),
                next_run: now + self.config.fast_interval,
                task: Arc::clone(&self.fast),
                in_flight: Arc::clone(&self.fast_in_flight),
            },
            Job {
                id: INITIAL_FAST_JOB_ID,
                trigger: Trigger::Once,
                next_run: now + self.config.initial_fast_delay,
                task: Arc::clone(&self.fast),
                in_flight: Arc::clone(&self.fast_in_flight),
            },
        ];
        *lock(&self.shared.shutdown) = false;

        let pool = ThreadPool::with_name("etl-worker".into(), self.config.workers.max(1));
        let shared = Arc::clone(&self.shared);
        let ticker_pool = pool.clone();
        let (tick, grace) = (self.config.tick, self.config.misfire_grace);

        let ticker = thread::Builder::new()
            .name("etl-scheduler".into())
            .spawn(move || tick_loop(&shared, &ticker_pool, tick, grace));

        match ticker {
            Ok(ticker) => {
                *runtime = Some(Runtime { ticker, pool });
                info!(
                    "scheduler started: full cycle every {:?}, measurements every {:?}",
                    self.config.slow_interval, self.config.fast_interval
                );
                true
            }
            Err(e) => {
                error!("failed to spawn scheduler thread: {}", e);
                lock(&self.shared.jobs).clear();
                false
            }
        }
    }

    /// Stops the ticker and waits for in-flight jobs. No-op when stopped.
    pub fn stop(&self) {
        let Some(runtime) = lock(&self.runtime).take() else {
            return;
        };

        info!("stopping scheduler");
        *lock(&self.shared.shutdown) = true;
        self.shared.wake.notify_all();

        if runtime.ticker.join().is_err() {
            error!("scheduler thread panicked");
        }
        runtime.pool.join();
        lock(&self.shared.jobs).clear();
        info!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick_loop(shared: &Shared, pool: &ThreadPool, tick: Duration, grace: Duration) {
    let mut shutdown = lock(&shared.shutdown);
    while !*shutdown {
        shutdown = shared
            .wake
            .wait_timeout(shutdown, tick)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
        if *shutdown {
            break;
        }
        dispatch_due(&mut lock(&shared.jobs), pool, grace, Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
