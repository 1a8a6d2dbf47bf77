//! Cron scheduler for the reconciliation sweep.
//!
//! Triggers a [`SweepJob`] on a cron schedule (nightly by default). Join
//! handles are tracked, cancellation is explicit, and every asynchronous
//! operation is wrapped in a timeout.
//!
//! Runs never overlap within one process: a tick that fires while the
//! previous run is still going is skipped and logged. There is no
//! cross-process lock, so deploy one scheduler per backend.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use recordcache_core::ReconciliationSweeper;
//! use recordcache_infra::scheduling::{SchedulerResult, SweepScheduler, SweepSchedulerConfig};
//!
//! # async fn example(sweeper: ReconciliationSweeper) -> SchedulerResult<()> {
//! let mut scheduler =
//!     SweepScheduler::with_config(SweepSchedulerConfig::default(), Arc::new(sweeper)).await?;
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use recordcache_core::ReconciliationSweeper;
use recordcache_domain::{RecordCacheError, SweepConfig, SweepReport};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// A unit of work the scheduler can run.
#[async_trait]
pub trait SweepJob: Send + Sync {
    async fn run(&self) -> Result<SweepReport, RecordCacheError>;
}

#[async_trait]
impl SweepJob for ReconciliationSweeper {
    async fn run(&self) -> Result<SweepReport, RecordCacheError> {
        ReconciliationSweeper::run(self).await
    }
}

/// Configuration for the sweep scheduler.
#[derive(Debug, Clone)]
pub struct SweepSchedulerConfig {
    /// Six-field cron expression describing the execution schedule.
    pub cron_expression: String,
    /// Timeout applied to a single sweep run.
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for SweepSchedulerConfig {
    fn default() -> Self {
        Self::from(&SweepConfig::default())
    }
}

impl From<&SweepConfig> for SweepSchedulerConfig {
    fn from(config: &SweepConfig) -> Self {
        Self {
            cron_expression: config.cron.clone(),
            job_timeout: config.job_timeout(),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Clears the in-flight flag however the run ends.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared state a run needs, cloned into the cron closure.
#[derive(Clone)]
struct Runner {
    job: Arc<dyn SweepJob>,
    in_flight: Arc<AtomicBool>,
    last_report: Arc<RwLock<Option<SweepReport>>>,
    job_timeout: Duration,
}

impl Runner {
    async fn run(&self) -> SchedulerResult<SweepReport> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            return Err(SchedulerError::SweepInProgress);
        };

        let started = Instant::now();
        let report = tokio::time::timeout(self.job_timeout, self.job.run())
            .await
            .map_err(|source| SchedulerError::Timeout { duration: self.job_timeout, source })??;

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "sweep run finished");
        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }
}

/// Sweep scheduler with explicit lifecycle management.
pub struct SweepScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    config: SweepSchedulerConfig,
    job_id: Uuid,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    runner: Runner,
}

impl SweepScheduler {
    /// Create a scheduler for `cron_expression` with default timeouts.
    pub async fn new(cron_expression: String, job: Arc<dyn SweepJob>) -> SchedulerResult<Self> {
        let config = SweepSchedulerConfig { cron_expression, ..Default::default() };
        Self::with_config(config, job).await
    }

    /// Create a scheduler with a custom configuration.
    pub async fn with_config(
        config: SweepSchedulerConfig,
        job: Arc<dyn SweepJob>,
    ) -> SchedulerResult<Self> {
        let raw_scheduler = JobScheduler::new()
            .await
            .map_err(|source| SchedulerError::CreationFailed { source })?;

        let runner = Runner {
            job,
            in_flight: Arc::new(AtomicBool::new(false)),
            last_report: Arc::new(RwLock::new(None)),
            job_timeout: config.job_timeout,
        };

        let mut scheduler = Self {
            scheduler: Arc::new(RwLock::new(raw_scheduler)),
            config,
            job_id: Uuid::nil(),
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            runner,
        };

        scheduler.job_id = scheduler.register_sweep_job().await?;
        Ok(scheduler)
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler = self.scheduler.clone();
        let start_timeout = self.config.start_timeout;
        let start_result = tokio::time::timeout(start_timeout, async move {
            let guard = scheduler.write().await;
            guard.start().await
        })
        .await
        .map_err(|source| SchedulerError::Timeout { duration: start_timeout, source })?;

        start_result.map_err(|source| SchedulerError::StartFailed { source })?;

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            Self::monitor_task(cancel).await;
        });

        self.monitor_handle = Some(handle);
        info!(cron = %self.config.cron_expression, "Sweep scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    ///
    /// A sweep already in progress is not interrupted; it finishes or hits
    /// its job timeout.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let scheduler = self.scheduler.clone();
        let stop_timeout = self.config.stop_timeout;
        let stop_result = tokio::time::timeout(stop_timeout, async move {
            let mut guard = scheduler.write().await;
            guard.shutdown().await
        })
        .await
        .map_err(|source| SchedulerError::Timeout { duration: stop_timeout, source })?;

        stop_result.map_err(|source| SchedulerError::StopFailed { source })?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|source| SchedulerError::Timeout { duration: join_timeout, source })??;
        }

        info!("Sweep scheduler stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Run one sweep now, outside the schedule, under the same guard and
    /// timeout as scheduled runs.
    ///
    /// # Errors
    /// `SweepInProgress` when a run is already going, `Timeout`, or
    /// `SweepFailed` carrying the sweep's own error.
    pub async fn run_once(&self) -> SchedulerResult<SweepReport> {
        self.runner.run().await
    }

    /// Returns true when the monitor task is active.
    pub fn is_running(&self) -> bool {
        self.monitor_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Whether a sweep is executing right now.
    pub fn is_sweeping(&self) -> bool {
        self.runner.in_flight.load(Ordering::Acquire)
    }

    /// Report of the most recent successful run.
    pub async fn last_report(&self) -> Option<SweepReport> {
        self.runner.last_report.read().await.clone()
    }

    async fn register_sweep_job(&mut self) -> SchedulerResult<Uuid> {
        if self.job_id != Uuid::nil() {
            return Ok(self.job_id);
        }

        let runner = self.runner.clone();
        let job_definition = Job::new_async(self.config.cron_expression.as_str(), move |_id, _lock| {
            let runner = runner.clone();

            Box::pin(async move {
                match runner.run().await {
                    Ok(report) => info!(
                        verified = report.total_verified(),
                        removed = report.total_removed(),
                        errors = report.total_errors(),
                        "Scheduled sweep finished"
                    ),
                    Err(SchedulerError::SweepInProgress) => {
                        warn!("Previous sweep still running, skipping this tick");
                    }
                    Err(SchedulerError::Timeout { duration, .. }) => {
                        warn!(timeout_secs = duration.as_secs(), "Scheduled sweep timed out");
                    }
                    Err(err) => error!(error = %err, "Scheduled sweep failed"),
                }
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        let job_id = job_definition.guid();
        let scheduler = self.scheduler.write().await;
        scheduler
            .add(job_definition)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        debug!(cron = %self.config.cron_expression, job_id = %job_id, "Registered sweep job");
        Ok(job_id)
    }

    async fn monitor_task(cancel: CancellationToken) {
        cancel.cancelled().await;
        debug!("Sweep scheduler monitor cancelled");
    }
}

impl Drop for SweepScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SweepScheduler dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;

    use chrono::Utc;

    use super::*;

    struct CountingJob {
        runs: AtomicUsize,
        delay: Duration,
    }

    impl CountingJob {
        fn new(delay: Duration) -> Self {
            Self { runs: AtomicUsize::new(0), delay }
        }

        fn run_count(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SweepJob for CountingJob {
        async fn run(&self) -> Result<SweepReport, RecordCacheError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let now = Utc::now();
            Ok(SweepReport { started_at: now, finished_at: now, kinds: BTreeMap::new() })
        }
    }

    struct FailingJob;

    #[async_trait]
    impl SweepJob for FailingJob {
        async fn run(&self) -> Result<SweepReport, RecordCacheError> {
            Err(RecordCacheError::Backend("unreachable".into()))
        }
    }

    fn fast_config() -> SweepSchedulerConfig {
        SweepSchedulerConfig {
            cron_expression: "*/1 * * * * *".into(), // every second
            job_timeout: Duration::from_secs(2),
            start_timeout: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(2),
            join_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_runs_successfully() {
        let job = Arc::new(CountingJob::new(Duration::ZERO));
        let mut scheduler =
            SweepScheduler::with_config(fast_config(), job.clone()).await.expect("scheduler created");

        scheduler.start().await.expect("start succeeds");
        tokio::time::sleep(Duration::from_secs(2)).await;
        scheduler.stop().await.expect("stop succeeds");

        assert!(job.run_count() >= 1);
        assert!(!scheduler.is_running());
        assert!(scheduler.last_report().await.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_start_is_rejected() {
        let job = Arc::new(CountingJob::new(Duration::ZERO));
        let mut scheduler =
            SweepScheduler::with_config(fast_config(), job).await.expect("scheduler created");

        scheduler.start().await.expect("first start");
        let err = scheduler.start().await.expect_err("second start fails");
        assert!(matches!(err, SchedulerError::AlreadyRunning));
        scheduler.stop().await.expect("stop succeeds");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_without_start_is_rejected() {
        let job = Arc::new(CountingJob::new(Duration::ZERO));
        let mut scheduler =
            SweepScheduler::with_config(fast_config(), job).await.expect("scheduler created");

        assert!(matches!(scheduler.stop().await, Err(SchedulerError::NotRunning)));
    }

    #[tokio::test]
    async fn invalid_cron_is_rejected_at_registration() {
        let config = SweepSchedulerConfig { cron_expression: "every night".into(), ..fast_config() };
        let result = SweepScheduler::with_config(config, Arc::new(FailingJob)).await;
        assert!(matches!(result, Err(SchedulerError::JobRegistrationFailed { .. })));
    }

    #[tokio::test]
    async fn overlapping_runs_are_refused() {
        let job = Arc::new(CountingJob::new(Duration::from_millis(200)));
        let scheduler =
            SweepScheduler::with_config(fast_config(), job.clone()).await.expect("scheduler created");

        let (first, second) = tokio::join!(scheduler.run_once(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            scheduler.run_once().await
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(SchedulerError::SweepInProgress)));
        assert_eq!(job.run_count(), 1);
        assert!(!scheduler.is_sweeping());
    }

    #[tokio::test]
    async fn timed_out_run_releases_the_guard() {
        let job = Arc::new(CountingJob::new(Duration::from_secs(5)));
        let config = SweepSchedulerConfig { job_timeout: Duration::from_millis(50), ..fast_config() };
        let scheduler = SweepScheduler::with_config(config, job.clone()).await.expect("scheduler");

        assert!(matches!(scheduler.run_once().await, Err(SchedulerError::Timeout { .. })));
        assert!(!scheduler.is_sweeping());
        assert!(matches!(scheduler.run_once().await, Err(SchedulerError::Timeout { .. })));
        assert_eq!(job.run_count(), 2);
    }

    #[tokio::test]
    async fn sweep_errors_surface_from_run_once() {
        let scheduler =
            SweepScheduler::with_config(fast_config(), Arc::new(FailingJob)).await.expect("scheduler");

        let err = scheduler.run_once().await.expect_err("sweep fails");
        assert!(matches!(err, SchedulerError::SweepFailed(RecordCacheError::Backend(_))));
        assert!(scheduler.last_report().await.is_none());
    }
}
