//! Scrape scheduler.
//!
//! One coordination task wakes every tick, asks the [`TargetStore`] for the
//! current targets, reconciles its per-target timers and dispatches due
//! targets into a bounded job queue. A fixed pool of workers drains the
//! queue: fetch, convert, write. A full queue blocks dispatch, so the amount
//! of outstanding work never exceeds `queue_depth + worker_count`.
//!
//! Lifecycle: `Created → Running → Closed`. A closed scheduler cannot be
//! restarted.

mod timers;
mod worker;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::scraper::{DEFAULT_FETCH_TIMEOUT, HttpScraper, Scraper};
use crate::target::{PlatformId, ScrapeTarget, TargetStore};
use crate::writer::PointsWriter;

use timers::TimerRegistry;
use worker::{JobQueue, WorkerContext};

/// Default job queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 100;
/// Default number of workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;
/// Default coordination tick (1 second).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Default grace period for workers on close (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors returned by the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid static configuration.
    #[error("invalid scheduler config: {0}")]
    Config(String),

    #[error("scheduler already started")]
    AlreadyStarted,

    #[error("scheduler is closed")]
    Closed,
}

fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}

fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}

fn default_tick_interval() -> Duration {
    DEFAULT_TICK_INTERVAL
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}

/// Static scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Jobs that may wait for a worker before dispatch blocks (default: 100).
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Concurrent scrape jobs (default: 4).
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Coordination tick, also the interval of targets without one
    /// (default: 1s).
    #[serde(default = "default_tick_interval", with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Per-fetch timeout (default: 10s).
    #[serde(default = "default_fetch_timeout", with = "humantime_serde")]
    pub fetch_timeout: Duration,
    /// How long `close` waits for workers before abandoning them
    /// (default: 5s).
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            worker_count: DEFAULT_WORKER_COUNT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl SchedulerConfig {
    /// # Errors
    /// Returns `SchedulerError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.worker_count == 0 {
            return Err(SchedulerError::Config(
                "worker_count must be positive".to_string(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(SchedulerError::Config(
                "queue_depth must be positive".to_string(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(SchedulerError::Config(
                "tick_interval must be non-zero".to_string(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(SchedulerError::Config(
                "fetch_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum SchedulerState {
    Created,
    Running,
    Closed,
}

struct Lifecycle {
    state: SchedulerState,
    tasks: Vec<JoinHandle<()>>,
}

/// Periodic scrape scheduler. See the module docs.
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn TargetStore>,
    writer: Arc<dyn PointsWriter>,
    scraper: Arc<dyn Scraper>,
    cancel: CancellationToken,
    target_count: Arc<AtomicUsize>,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("target_count", &self.target_count())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler that scrapes over HTTP.
    ///
    /// # Errors
    /// Returns `SchedulerError::Config` if `config` is invalid. Nothing is
    /// contacted until [`start`](Self::start).
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn TargetStore>,
        writer: Arc<dyn PointsWriter>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let scraper = HttpScraper::new(config.fetch_timeout)
            .map_err(|e| SchedulerError::Config(e.to_string()))?;

        Ok(Self {
            config,
            store,
            writer,
            scraper: Arc::new(scraper),
            cancel: CancellationToken::new(),
            target_count: Arc::new(AtomicUsize::new(0)),
            lifecycle: Mutex::new(Lifecycle {
                state: SchedulerState::Created,
                tasks: Vec::new(),
            }),
        })
    }

    /// Replace the scrape executor. Only meaningful before `start`.
    pub fn with_scraper(mut self, scraper: Arc<dyn Scraper>) -> Self {
        self.scraper = scraper;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        self.lifecycle().state
    }

    /// Number of targets with a live timer, as of the last tick.
    pub fn target_count(&self) -> usize {
        self.target_count.load(Ordering::Relaxed)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the workers and the coordination loop.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Fails if the scheduler was already started or closed.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut lifecycle = self.lifecycle();
        match lifecycle.state {
            SchedulerState::Created => {}
            SchedulerState::Running => return Err(SchedulerError::AlreadyStarted),
            SchedulerState::Closed => return Err(SchedulerError::Closed),
        }

        let (job_tx, job_rx) = mpsc::channel::<ScrapeTarget>(self.config.queue_depth);
        let (done_tx, done_rx) = mpsc::unbounded_channel::<PlatformId>();
        let jobs: JobQueue = Arc::new(tokio::sync::Mutex::new(job_rx));
        let ctx = Arc::new(WorkerContext {
            scraper: Arc::clone(&self.scraper),
            writer: Arc::clone(&self.writer),
            cancel: self.cancel.clone(),
        });

        let mut tasks = Vec::with_capacity(self.config.worker_count + 1);
        for worker_id in 0..self.config.worker_count {
            tasks.push(tokio::spawn(worker::run(
                worker_id,
                Arc::clone(&ctx),
                Arc::clone(&jobs),
                done_tx.clone(),
            )));
        }
        drop(done_tx);

        let coordinator = Coordinator {
            store: Arc::clone(&self.store),
            timers: TimerRegistry::new(self.config.tick_interval),
            jobs: job_tx,
            done: done_rx,
            cancel: self.cancel.clone(),
            target_count: Arc::clone(&self.target_count),
        };
        tasks.push(tokio::spawn(coordinator.run(self.config.tick_interval)));

        lifecycle.tasks = tasks;
        lifecycle.state = SchedulerState::Running;
        tracing::info!(
            worker_count = self.config.worker_count,
            queue_depth = self.config.queue_depth,
            tick_interval = ?self.config.tick_interval,
            "Scheduler started"
        );
        Ok(())
    }

    /// Stop scheduling and shut the workers down.
    ///
    /// In-flight network and writer calls are cancelled. Workers get up to
    /// `shutdown_timeout` to return before they are aborted. Calling this
    /// more than once is a no-op.
    pub async fn close(&self) {
        let tasks = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state == SchedulerState::Closed {
                return;
            }
            lifecycle.state = SchedulerState::Closed;
            std::mem::take(&mut lifecycle.tasks)
        };

        self.cancel.cancel();
        if tasks.is_empty() {
            tracing::info!("Scheduler closed before start");
            return;
        }

        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        let drained = tokio::time::timeout(self.config.shutdown_timeout, async move {
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "Scheduler task ended abnormally");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                timeout = ?self.config.shutdown_timeout,
                "Scheduler shutdown timed out, abandoning workers"
            );
            for abort in aborts {
                abort.abort();
            }
        } else {
            tracing::info!("Scheduler shutdown complete");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State owned by the coordination task.
struct Coordinator {
    store: Arc<dyn TargetStore>,
    timers: TimerRegistry,
    jobs: mpsc::Sender<ScrapeTarget>,
    done: mpsc::UnboundedReceiver<PlatformId>,
    cancel: CancellationToken,
    target_count: Arc<AtomicUsize>,
}

impl Coordinator {
    async fn run(mut self, tick: Duration) {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(id) = self.done.recv() => self.timers.complete(id),
                _ = ticker.tick() => {
                    if !self.tick().await {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Coordination loop stopped");
    }

    /// One coordination pass. Returns `false` once the loop should stop.
    async fn tick(&mut self) -> bool {
        let listed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return false,
            listed = self.store.list_targets() => listed,
        };
        let targets = match listed {
            Ok(targets) => targets,
            Err(e) => {
                tracing::warn!(error = %e, "Listing targets failed, skipping tick");
                return true;
            }
        };

        let changes = self.timers.reconcile(targets, Instant::now());
        self.target_count.store(self.timers.len(), Ordering::Relaxed);
        if !changes.is_empty() {
            tracing::info!(
                added = changes.added,
                removed = changes.removed,
                retimed = changes.retimed,
                targets = self.timers.len(),
                "Targets reconciled"
            );
        }

        for target in self.timers.take_due(Instant::now()) {
            let target_id = target.id;
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                sent = self.jobs.send(target) => {
                    if sent.is_err() {
                        tracing::debug!(target_id = %target_id, "Job queue closed");
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, PlatformError};
    use crate::model::{Metric, MetricType, MetricsSlice, Point};
    use crate::scraper::ScrapeError;
    use crate::target::{StaticTargetStore, TargetStoreError};
    use crate::writer::WriteError;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;

    const TICK: Duration = Duration::from_millis(20);

    /// Serves a gauge for every target, failing the ones listed in `fail`.
    #[derive(Default)]
    struct StubScraper {
        fail: Vec<PlatformId>,
        delay: Option<Duration>,
        running: Mutex<HashMap<PlatformId, usize>>,
        overlapped: AtomicBool,
    }

    #[async_trait::async_trait]
    impl Scraper for StubScraper {
        async fn fetch(
            &self,
            target: &ScrapeTarget,
            cancel: &CancellationToken,
        ) -> Result<MetricsSlice, ScrapeError> {
            {
                let mut running = self.running.lock().unwrap();
                let n = running.entry(target.id).or_default();
                *n += 1;
                if *n > 1 {
                    self.overlapped.store(true, Ordering::SeqCst);
                }
            }
            if let Some(delay) = self.delay {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            *self.running.lock().unwrap().entry(target.id).or_default() -= 1;

            if cancel.is_cancelled() {
                return Err(ScrapeError::Cancelled(target.url.clone()));
            }
            if self.fail.contains(&target.id) {
                return Err(PlatformError::new(ErrorCode::Unavailable).into());
            }
            Ok(MetricsSlice::new(vec![
                Metric::new("go_goroutines", MetricType::Gauge, Utc::now())
                    .with_field("gauge", 36.0),
            ]))
        }
    }

    /// Holds every fetch until a permit is released and tracks how many
    /// fetches run at once.
    struct GatedScraper {
        gate: tokio::sync::Semaphore,
        started: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl GatedScraper {
        fn new() -> Self {
            Self {
                gate: tokio::sync::Semaphore::new(0),
                started: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Scraper for GatedScraper {
        async fn fetch(
            &self,
            target: &ScrapeTarget,
            cancel: &CancellationToken,
        ) -> Result<MetricsSlice, ScrapeError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);

            let permit = tokio::select! {
                _ = cancel.cancelled() => None,
                permit = self.gate.acquire() => permit.ok(),
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match permit {
                Some(permit) => {
                    permit.forget();
                    Ok(MetricsSlice::new(vec![
                        Metric::new("go_goroutines", MetricType::Gauge, Utc::now())
                            .with_field("gauge", 36.0),
                    ]))
                }
                None => Err(ScrapeError::Cancelled(target.url.clone())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        batches: Mutex<Vec<(PlatformId, Vec<Point>)>>,
    }

    impl RecordingWriter {
        fn count_for(&self, bucket: PlatformId) -> usize {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .filter(|(b, _)| *b == bucket)
                .count()
        }

        fn total(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl PointsWriter for RecordingWriter {
        async fn write_points(
            &self,
            _cancel: &CancellationToken,
            _org_id: PlatformId,
            bucket_id: PlatformId,
            points: Vec<Point>,
        ) -> Result<(), WriteError> {
            self.batches.lock().unwrap().push((bucket_id, points));
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl TargetStore for FailingStore {
        async fn list_targets(&self) -> Result<Vec<ScrapeTarget>, TargetStoreError> {
            Err(TargetStoreError::Unavailable("down".into()))
        }
    }

    fn id(n: u64) -> PlatformId {
        PlatformId::new(n).unwrap()
    }

    /// Target `n` writes to bucket `n` so deliveries can be told apart.
    fn target(n: u64) -> ScrapeTarget {
        ScrapeTarget::new(id(n), format!("http://127.0.0.1/{n}"), id(1000), id(n))
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: TICK,
            shutdown_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    fn scheduler(
        store: Arc<dyn TargetStore>,
        scraper: StubScraper,
        writer: Arc<RecordingWriter>,
    ) -> Scheduler {
        Scheduler::new(config(), store, writer)
            .unwrap()
            .with_scraper(Arc::new(scraper))
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    #[test]
    fn test_config_validation() {
        assert!(SchedulerConfig::default().validate().is_ok());

        let cases = [
            SchedulerConfig {
                worker_count: 0,
                ..Default::default()
            },
            SchedulerConfig {
                queue_depth: 0,
                ..Default::default()
            },
            SchedulerConfig {
                tick_interval: Duration::ZERO,
                ..Default::default()
            },
            SchedulerConfig {
                fetch_timeout: Duration::ZERO,
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(SchedulerError::Config(_))));
        }
    }

    #[test]
    fn test_new_rejects_zero_workers() {
        let config = SchedulerConfig {
            worker_count: 0,
            ..Default::default()
        };
        let result = Scheduler::new(
            config,
            Arc::new(StaticTargetStore::default()),
            Arc::new(RecordingWriter::default()),
        );
        assert!(matches!(result, Err(SchedulerError::Config(_))));
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: SchedulerConfig = serde_yaml::from_str("worker_count: 8\ntick_interval: 250ms\n").unwrap();
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.queue_depth, DEFAULT_QUEUE_DEPTH);
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[tokio::test]
    async fn test_delivers_batches_per_target() {
        let store = StaticTargetStore::new((1..=3).map(target).collect());
        let writer = Arc::new(RecordingWriter::default());
        let sched = scheduler(Arc::new(store), StubScraper::default(), writer.clone());

        sched.start().unwrap();
        assert_eq!(sched.state(), SchedulerState::Running);
        wait_until(|| (1..=3).all(|n| writer.count_for(id(n)) >= 3)).await;
        assert_eq!(sched.target_count(), 3);
        sched.close().await;

        for (_, points) in writer.batches.lock().unwrap().iter() {
            assert_eq!(points.len(), 1);
            assert_eq!(points[0].measurement(), "go_goroutines");
        }
    }

    #[tokio::test]
    async fn test_failing_target_does_not_block_others() {
        let store = StaticTargetStore::new(vec![target(1), target(2)]);
        let writer = Arc::new(RecordingWriter::default());
        let scraper = StubScraper {
            fail: vec![id(1)],
            ..Default::default()
        };
        let sched = scheduler(Arc::new(store), scraper, writer.clone());

        sched.start().unwrap();
        wait_until(|| writer.count_for(id(2)) >= 3).await;
        sched.close().await;
        assert_eq!(writer.count_for(id(1)), 0);
    }

    #[tokio::test]
    async fn test_removed_target_stops() {
        let store = StaticTargetStore::new(vec![target(1), target(2)]);
        let writer = Arc::new(RecordingWriter::default());
        let sched = scheduler(Arc::new(store.clone()), StubScraper::default(), writer.clone());

        sched.start().unwrap();
        wait_until(|| writer.count_for(id(1)) >= 1).await;
        assert!(store.remove(id(1)).await);
        wait_until(|| sched.target_count() == 1).await;

        // Let any job dispatched before the removal land.
        tokio::time::sleep(TICK * 3).await;
        let before = writer.count_for(id(1));
        let others = writer.count_for(id(2));
        wait_until(|| writer.count_for(id(2)) >= others + 3).await;
        assert_eq!(writer.count_for(id(1)), before);
        sched.close().await;
    }

    #[tokio::test]
    async fn test_slow_target_never_overlaps() {
        let store = StaticTargetStore::new(vec![target(1)]);
        let writer = Arc::new(RecordingWriter::default());
        let scraper = Arc::new(StubScraper {
            delay: Some(TICK * 4),
            ..Default::default()
        });
        let sched = Scheduler::new(config(), Arc::new(store), writer.clone())
            .unwrap()
            .with_scraper(scraper.clone());

        sched.start().unwrap();
        wait_until(|| writer.total() >= 3).await;
        sched.close().await;
        assert!(!scraper.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrency() {
        let store = StaticTargetStore::new((1..=8).map(target).collect());
        let writer = Arc::new(RecordingWriter::default());
        let scraper = Arc::new(GatedScraper::new());
        let config = SchedulerConfig {
            worker_count: 2,
            queue_depth: 2,
            ..config()
        };
        let sched = Scheduler::new(config, Arc::new(store), writer.clone())
            .unwrap()
            .with_scraper(scraper.clone());

        sched.start().unwrap();
        wait_until(|| scraper.started() == 2).await;

        // Both workers held, two jobs queued, dispatch blocked on the rest.
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(scraper.started(), 2);

        scraper.gate.add_permits(1);
        wait_until(|| writer.total() == 1).await;
        wait_until(|| scraper.started() == 3).await;
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(scraper.started(), 3);
        assert_eq!(scraper.max_in_flight.load(Ordering::SeqCst), 2);

        // A coordinator blocked on a full queue still shuts down promptly.
        let started = std::time::Instant::now();
        sched.close().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(sched.state(), SchedulerState::Closed);
    }

    #[tokio::test]
    async fn test_store_errors_keep_running() {
        let writer = Arc::new(RecordingWriter::default());
        let sched = scheduler(Arc::new(FailingStore), StubScraper::default(), writer.clone());

        sched.start().unwrap();
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(sched.state(), SchedulerState::Running);
        assert_eq!(writer.total(), 0);
        sched.close().await;
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let sched = scheduler(
            Arc::new(StaticTargetStore::default()),
            StubScraper::default(),
            Arc::new(RecordingWriter::default()),
        );
        assert_eq!(sched.state(), SchedulerState::Created);

        sched.start().unwrap();
        assert!(matches!(sched.start(), Err(SchedulerError::AlreadyStarted)));

        sched.close().await;
        sched.close().await;
        assert_eq!(sched.state(), SchedulerState::Closed);
        assert!(matches!(sched.start(), Err(SchedulerError::Closed)));
    }

    #[tokio::test]
    async fn test_close_before_start() {
        let sched = scheduler(
            Arc::new(StaticTargetStore::default()),
            StubScraper::default(),
            Arc::new(RecordingWriter::default()),
        );
        sched.close().await;
        assert_eq!(sched.state(), SchedulerState::Closed);
        assert!(matches!(sched.start(), Err(SchedulerError::Closed)));
    }

    #[tokio::test]
    async fn test_close_cancels_in_flight_fetch() {
        let store = StaticTargetStore::new(vec![target(1)]);
        let writer = Arc::new(RecordingWriter::default());
        let scraper = Arc::new(StubScraper {
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let sched = Scheduler::new(config(), Arc::new(store), writer.clone())
            .unwrap()
            .with_scraper(scraper.clone());

        sched.start().unwrap();
        wait_until(|| scraper.running.lock().unwrap().get(&id(1)) == Some(&1)).await;

        let started = std::time::Instant::now();
        sched.close().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(writer.total(), 0);
    }
}
