//! Recurring ingestion cycles with single-flight execution and retries.
//!
//! The [`Scheduler`] is either idle (no timer) or running (timer armed; a
//! cycle may or may not be in flight). [`Scheduler::start`] fires one cycle
//! straight away and then arms a repeating timer; each tick spawns another
//! cycle. A cycle that is triggered while another is still in flight is
//! dropped, not queued.
//!
//! Each cycle calls [`SourceIngestor::scrape_from_multiple_sources`] up to
//! `max_retries + 1` times with a fixed delay in between, then folds the
//! outcome into [`SchedulerStats`]. Cycles are never interrupted: `stop`
//! only disarms the timer and `shutdown` waits for the in-flight cycle.

use crate::config::{ScheduleConfig, ScheduleConfigUpdate, SourceConfig};
use crate::error::{IngestError, Result};
use crate::models::{SchedulerStats, ScrapingResult};
use crate::orchestrator::SourceIngestor;
use crate::retry::{Retried, retry_fixed};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{error, info, instrument, warn};

/// How often `shutdown` re-checks for an in-flight cycle.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What a single cycle trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was in flight; nothing ran and no counters moved.
    Skipped,
    Succeeded { attempts: u32 },
    Failed { attempts: u32 },
}

/// Cheap to clone; all clones drive the same timer and statistics.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    ingestor: Arc<dyn SourceIngestor>,
    sources: Vec<SourceConfig>,
    config: Mutex<ScheduleConfig>,
    stats: Mutex<SchedulerStats>,
    cycle_running: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Holds the single-flight flag for the lifetime of one cycle.
struct CycleGuard {
    inner: Arc<Inner>,
}

impl CycleGuard {
    fn acquire(inner: &Arc<Inner>) -> Option<Self> {
        inner
            .cycle_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self {
            inner: Arc::clone(inner),
        })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.inner.cycle_running.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("sources", &self.inner.sources.len())
            .field("config", &self.config())
            .field("scheduler_running", &self.is_scheduler_running())
            .field("cycle_running", &self.is_cycle_running())
            .finish()
    }
}

impl Scheduler {
    pub fn new(
        ingestor: Arc<dyn SourceIngestor>,
        sources: Vec<SourceConfig>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ingestor,
                sources,
                config: Mutex::new(config),
                stats: Mutex::new(SchedulerStats::default()),
                cycle_running: AtomicBool::new(false),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Run one cycle now and arm the repeating timer.
    ///
    /// No-op when already running or when the config is disabled. Must be
    /// called from within a Tokio runtime.
    pub fn start(&self) {
        let config = self.config();
        let mut timer = lock(&self.inner.timer);
        if timer.is_some() || !config.enabled {
            warn!(
                running = timer.is_some(),
                enabled = config.enabled,
                "Ingestion scheduler is already running or disabled"
            );
            return;
        }

        info!(interval_minutes = config.interval_minutes, "Starting ingestion scheduler");

        match self.begin_cycle() {
            Some((guard, run)) => {
                let scheduler = self.clone();
                tokio::spawn(async move {
                    scheduler.execute_cycle(guard, run).await;
                });
            }
            None => warn!("Ingestion cycle already in progress, skipping immediate run"),
        }

        let period = config.interval();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let scheduler = Scheduler { inner };
                tokio::spawn(async move {
                    scheduler.run_scraping_cycle().await;
                });
            }
        }));
        drop(timer);

        self.update_next_run();
    }

    /// Disarm the timer and clear `next_run`. An in-flight cycle keeps going.
    pub fn stop(&self) {
        let Some(handle) = lock(&self.inner.timer).take() else {
            return;
        };
        handle.abort();
        lock(&self.inner.stats).next_run = None;
        info!("Ingestion scheduler stopped");
    }

    /// Run one full cycle unless another is already in flight.
    pub async fn run_scraping_cycle(&self) -> CycleOutcome {
        match self.begin_cycle() {
            Some((guard, run)) => self.execute_cycle(guard, run).await,
            None => {
                warn!("Ingestion cycle already in progress, skipping this run");
                CycleOutcome::Skipped
            }
        }
    }

    /// Scrape the configured source called `name`, once, without retries.
    #[instrument(level = "info", skip(self))]
    pub async fn run_single_source(&self, name: &str) -> Result<ScrapingResult> {
        info!("Running single source ingestion");
        let config = self
            .inner
            .sources
            .iter()
            .find(|config| config.name == name)
            .ok_or_else(|| IngestError::ConfigNotFound(name.to_string()))?;

        match self.inner.ingestor.scrape_from_source(config).await {
            Ok(result) => {
                info!(
                    success = result.success,
                    duplicates = result.duplicates,
                    failed = result.failed,
                    "Single source ingestion completed"
                );
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, "Single source ingestion failed");
                Err(e)
            }
        }
    }

    /// Merge `update` into the config, restarting the timer if it was armed
    /// and the merged config is still enabled.
    ///
    /// An update whose merged result fails validation is rejected and leaves
    /// both the config and the timer untouched.
    pub fn update_config(&self, update: ScheduleConfigUpdate) -> Result<()> {
        let merged = self.config().merge(&update);
        if let Err(e) = merged.validate() {
            warn!(error = %e, "Rejected ingestion scheduler configuration update");
            return Err(e);
        }

        let was_running = self.is_scheduler_running();
        if was_running {
            self.stop();
        }

        *lock(&self.inner.config) = merged.clone();
        info!(config = ?merged, "Ingestion scheduler configuration updated");

        if was_running && merged.enabled {
            self.start();
        }
        Ok(())
    }

    /// Zero every counter and `last_run`; `next_run` is kept.
    pub fn reset_stats(&self) {
        let mut stats = lock(&self.inner.stats);
        *stats = SchedulerStats {
            next_run: stats.next_run,
            ..SchedulerStats::default()
        };
        info!("Ingestion scheduler statistics reset");
    }

    /// Stop the timer, then wait for any in-flight cycle to finish.
    pub async fn shutdown(&self) {
        info!("Shutting down ingestion scheduler");
        self.stop();
        while self.is_cycle_running() {
            info!("Waiting for current ingestion cycle to complete");
            sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
        info!("Ingestion scheduler shutdown complete");
    }

    pub fn stats(&self) -> SchedulerStats {
        lock(&self.inner.stats).clone()
    }

    pub fn config(&self) -> ScheduleConfig {
        lock(&self.inner.config).clone()
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.inner.sources
    }

    pub fn is_scheduler_running(&self) -> bool {
        lock(&self.inner.timer).is_some()
    }

    pub fn is_cycle_running(&self) -> bool {
        self.inner.cycle_running.load(Ordering::Acquire)
    }

    /// Claim the single-flight flag and count the run. Synchronous so that
    /// `start` records the run before its spawned cycle is first polled.
    fn begin_cycle(&self) -> Option<(CycleGuard, u64)> {
        let guard = CycleGuard::acquire(&self.inner)?;
        let mut stats = lock(&self.inner.stats);
        stats.total_runs += 1;
        stats.last_run = Some(Utc::now());
        Some((guard, stats.total_runs))
    }

    #[instrument(level = "info", skip(self, guard))]
    async fn execute_cycle(&self, guard: CycleGuard, run: u64) -> CycleOutcome {
        let config = self.config();
        info!("Starting ingestion cycle");

        let inner: &Inner = &self.inner;
        let max_attempts = config.max_retries.saturating_add(1);
        let retried = retry_fixed(config.max_retries, config.retry_delay(), move |attempt| {
            info!(attempt, max_attempts, "Running ingestion attempt");
            inner.ingestor.scrape_from_multiple_sources(&inner.sources)
        })
        .await;

        let attempts = retried.attempts();
        let outcome = match retried {
            Retried::Succeeded { value: results, .. } => {
                for (name, result) in &results {
                    info!(
                        source = %name,
                        success = result.success,
                        duplicates = result.duplicates,
                        failed = result.failed,
                        "Source ingested"
                    );
                }
                let total = ScrapingResult::total(results.values());
                {
                    let mut stats = lock(&inner.stats);
                    stats.total_items_scraped += total.success as u64;
                    stats.total_duplicates += total.duplicates as u64;
                    stats.successful_runs += 1;
                }
                info!(
                    attempts,
                    success = total.success,
                    duplicates = total.duplicates,
                    "Ingestion cycle completed successfully"
                );
                CycleOutcome::Succeeded { attempts }
            }
            Retried::Exhausted { error, .. } => {
                lock(&inner.stats).failed_runs += 1;
                error!(attempts, error = %error, "Ingestion cycle failed on every attempt");
                CycleOutcome::Failed { attempts }
            }
        };

        drop(guard);
        self.update_next_run();
        outcome
    }

    fn update_next_run(&self) {
        if !self.is_scheduler_running() {
            return;
        }
        let next_run = chrono::Duration::from_std(self.config().interval())
            .ok()
            .and_then(|period| Utc::now().checked_add_signed(period));
        lock(&self.inner.stats).next_run = next_run;
    }
}
