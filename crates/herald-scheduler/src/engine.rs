//! Scheduler engine: accepts jobs and runs the delivery loop.
//!
//! The JobSet lives behind one async mutex shared by the submission path and
//! the loop. Every read-modify-write span holds it, and every change is
//! flushed to the [`JobStore`] before it is considered committed. The lock is
//! released while a delivery is in flight so submissions stay prompt.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use herald_core::DeliveryPort;
use herald_core::config::SchedulerConfig;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::clock::{Clock, Ticker};
use crate::error::SchedulerError;
use crate::job::{DueJob, Job, JobSet, JobStatus, JobView, parse_target_time};
use crate::store::{JobStore, StoreLock};

/// Loop policy knobs.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub poll_interval: Duration,
    pub delivery_timeout: Duration,
    /// Prune terminal jobs older than this after each tick.
    pub retention: Option<Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            delivery_timeout: Duration::from_secs(30),
            retention: None,
        }
    }
}

impl From<&SchedulerConfig> for SchedulerOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            delivery_timeout: config.delivery_timeout(),
            retention: config.retention(),
        }
    }
}

/// Identifies an accepted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub recipient: String,
    pub target_time: NaiveDateTime,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sent: usize,
    pub failed: usize,
    /// Jobs cancelled or resolved elsewhere while their delivery was in flight.
    pub skipped: usize,
    /// A flush failed and the rest of the tick was abandoned.
    pub aborted: bool,
}

struct State {
    jobs: JobSet,
    /// In-memory changes not yet flushed.
    dirty: bool,
}

/// The scheduled-message queue. Owns the store exclusively: a second
/// `open` on the same store, from any process, fails with `StoreLocked`.
pub struct Scheduler {
    store: JobStore,
    _lock: StoreLock,
    port: Arc<dyn DeliveryPort>,
    clock: Arc<dyn Clock>,
    options: SchedulerOptions,
    state: Mutex<State>,
    /// Serializes whole ticks so a due job is never picked up twice.
    tick_lock: Mutex<()>,
}

impl Scheduler {
    /// Lock and load the store, then build the scheduler. A corrupt or
    /// already-owned store is fatal.
    pub fn open(
        store: JobStore,
        port: Arc<dyn DeliveryPort>,
        clock: Arc<dyn Clock>,
        options: SchedulerOptions,
    ) -> Result<Self, SchedulerError> {
        let lock = store.lock()?;
        let mut jobs = store.load()?;
        let backfilled = jobs.backfill_ids();
        if backfilled > 0 {
            store.save(&jobs)?;
            tracing::info!("🔖 Assigned ids to {backfilled} stored jobs");
        }
        tracing::info!(
            "📅 Loaded {} scheduled messages ({} pending) from {}",
            jobs.len(),
            jobs.count_with_status(JobStatus::Pending),
            store.path().display()
        );

        Ok(Self {
            store,
            _lock: lock,
            port,
            clock,
            options,
            state: Mutex::new(State { jobs, dirty: false }),
            tick_lock: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Schedule `payload` for `recipient` at `target_time_text`
    /// (`YYYY-MM-DD HH:MM:SS`, local time). Nothing changes on error.
    pub async fn submit(
        &self,
        recipient: &str,
        payload: &str,
        target_time_text: &str,
    ) -> Result<JobHandle, SchedulerError> {
        if recipient.trim().is_empty() {
            return Err(SchedulerError::EmptyRecipient);
        }
        let target_time = parse_target_time(target_time_text)?;
        if target_time <= self.clock.now() {
            return Err(SchedulerError::PastScheduling {
                requested: target_time,
            });
        }

        let job = Job::pending(payload, target_time);
        let handle = JobHandle {
            id: job.id.clone(),
            recipient: recipient.to_string(),
            target_time,
        };

        let mut state = self.state.lock().await;
        let mut next = state.jobs.clone();
        next.push(recipient, job);
        self.store.save(&next)?;
        state.jobs = next;
        state.dirty = false;

        tracing::info!(
            "📅 Scheduled message {} for {} at {}",
            handle.id,
            handle.recipient,
            handle.target_time
        );
        Ok(handle)
    }

    /// Jobs in scan order, optionally for one recipient only.
    pub async fn list(&self, recipient: Option<&str>) -> Vec<JobView> {
        self.state.lock().await.jobs.views(recipient)
    }

    pub async fn get(&self, id: &str) -> Option<JobView> {
        self.state.lock().await.jobs.view(id)
    }

    /// Snapshot of the whole JobSet.
    pub async fn snapshot(&self) -> JobSet {
        self.state.lock().await.jobs.clone()
    }

    /// Remove a pending job.
    pub async fn cancel(&self, id: &str) -> Result<JobView, SchedulerError> {
        let mut state = self.state.lock().await;
        let view = state
            .jobs
            .view(id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.to_string()))?;
        if view.status != JobStatus::Pending {
            return Err(SchedulerError::NotPending {
                id: id.to_string(),
                status: view.status,
            });
        }

        let mut next = state.jobs.clone();
        next.remove(id);
        self.store.save(&next)?;
        state.jobs = next;
        state.dirty = false;

        tracing::info!("🗑️ Cancelled scheduled message {} for {}", id, view.recipient);
        Ok(view)
    }

    /// Drop sent/failed jobs whose target time is older than `retention`.
    pub async fn prune(&self, retention: Duration) -> Result<usize, SchedulerError> {
        let Ok(window) = chrono::TimeDelta::from_std(retention) else {
            return Ok(0);
        };
        let Some(cutoff) = self.clock.now().checked_sub_signed(window) else {
            return Ok(0);
        };

        let mut state = self.state.lock().await;
        let mut next = state.jobs.clone();
        let removed = next.prune_terminal_before(cutoff);
        if removed == 0 {
            return Ok(0);
        }
        self.store.save(&next)?;
        state.jobs = next;
        state.dirty = false;

        tracing::info!("🧹 Pruned {removed} finished messages older than {cutoff}");
        Ok(removed)
    }

    /// One scan: deliver every due pending job in scan order, flushing after
    /// each status change.
    pub async fn tick(&self) -> TickReport {
        let _tick = self.tick_lock.lock().await;
        let mut report = TickReport::default();

        let due = {
            let mut state = self.state.lock().await;
            if state.dirty {
                if let Err(e) = self.store.save(&state.jobs) {
                    tracing::error!("❌ Job store still not writable, skipping tick: {e}");
                    report.aborted = true;
                    return report;
                }
                state.dirty = false;
                tracing::info!("💾 Flushed job changes left over from an earlier tick");
            }
            state.jobs.due(self.clock.now())
        };

        for job in due {
            let outcome = self.attempt(&job).await;

            let mut state = self.state.lock().await;
            let Some(entry) = state.jobs.find_mut(&job.id) else {
                tracing::warn!(
                    "⚠️ Message {} was cancelled while being delivered to {}",
                    job.id,
                    job.recipient
                );
                report.skipped += 1;
                continue;
            };

            let changed = match &outcome {
                Ok(()) => entry.mark_sent(),
                Err(reason) => entry.mark_failed(reason.clone()),
            };
            if !changed {
                report.skipped += 1;
                continue;
            }
            match outcome {
                Ok(()) => {
                    tracing::info!("✅ Delivered message {} to {}", job.id, job.recipient);
                    report.sent += 1;
                }
                Err(reason) => {
                    tracing::warn!(
                        "⚠️ Delivery of message {} to {} failed: {}",
                        job.id,
                        job.recipient,
                        reason
                    );
                    report.failed += 1;
                }
            }

            if let Err(e) = self.store.save(&state.jobs) {
                state.dirty = true;
                tracing::error!("❌ Failed to persist job status, retrying next tick: {e}");
                report.aborted = true;
                return report;
            }
        }

        report
    }

    async fn attempt(&self, job: &DueJob) -> Result<(), String> {
        let timeout = self.options.delivery_timeout;
        match tokio::time::timeout(timeout, self.port.deliver(&job.recipient, &job.payload)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "{} delivery timed out after {}s",
                self.port.name(),
                timeout.as_secs_f32()
            )),
        }
    }

    /// Run the delivery loop until `shutdown` turns true or its sender is
    /// dropped. A tick in progress always completes first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "⏰ Scheduler started (check every {}s, delivering via {})",
            self.options.poll_interval.as_secs(),
            self.port.name()
        );

        let mut ticker = Ticker::new(self.options.poll_interval);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let report = self.tick().await;
            if report.sent + report.failed > 0 {
                tracing::info!(
                    "📣 Tick delivered {} message(s), {} failed",
                    report.sent,
                    report.failed
                );
            }

            if let Some(retention) = self.options.retention
                && let Err(e) = self.prune(retention).await
            {
                tracing::error!("❌ Failed to prune finished messages: {e}");
            }
        }

        tracing::info!("🛑 Scheduler stopped");
    }

    /// Spawn [`Scheduler::run`] on the tokio runtime.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move { self.run(shutdown_rx).await });
        SchedulerHandle { shutdown_tx, join }
    }
}

/// Handle to a spawned delivery loop.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop and wait for it to finish its current tick.
    pub async fn shutdown(self) {
        self.shutdown_tx.send(true).ok();
        if let Err(e) = self.join.await {
            tracing::error!("Scheduler task ended abnormally: {e}");
        }
    }
}
