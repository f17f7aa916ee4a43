//! Non-overlapping periodic ticks on tokio.
//!
//! [`SharedEngine::tick`] refuses to start while another tick is in flight
//! (`TickSkipped`). [`SharedEngine::spawn`] drives ticks from an interval
//! whose missed ticks are skipped, never bunched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use stakeflow_types::{Custody, Result, StakeRegistry, StakeflowError, VoteEscrow};
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::Engine;
use crate::report::TickReport;

pub struct SharedEngine<R: StakeRegistry, E: VoteEscrow, C: Custody> {
    engine: Arc<Mutex<Engine<R, E, C>>>,
    in_flight: Arc<AtomicBool>,
    /// `controller.tick_interval_secs` captured at construction.
    period: Duration,
}

impl<R: StakeRegistry, E: VoteEscrow, C: Custody> Clone for SharedEngine<R, E, C> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            in_flight: Arc::clone(&self.in_flight),
            period: self.period,
        }
    }
}

/// Clears the in-flight flag when the tick ends, including on panic.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<R, E, C> SharedEngine<R, E, C>
where
    R: StakeRegistry + Send + 'static,
    E: VoteEscrow + Send + 'static,
    C: Custody + Send + 'static,
{
    pub fn new(engine: Engine<R, E, C>) -> Self {
        let period = Duration::from_secs(engine.controller().config().tick_interval_secs);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            in_flight: Arc::new(AtomicBool::new(false)),
            period,
        }
    }

    /// Configured spacing of scheduled ticks.
    pub fn tick_interval(&self) -> Duration {
        self.period
    }

    /// Tick at the configured interval until the handle is stopped.
    pub fn spawn_configured(&self) -> SchedulerHandle {
        self.spawn(self.period)
    }

    /// Exclusive access for user operations between ticks.
    pub async fn lock(&self) -> MutexGuard<'_, Engine<R, E, C>> {
        self.engine.lock().await
    }

    pub fn is_ticking(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one tick unless one is already running.
    ///
    /// # Errors
    /// `TickSkipped` while another tick is in flight.
    pub async fn tick(&self) -> Result<TickReport> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!("tick skipped: previous tick in flight");
            return Err(StakeflowError::TickSkipped);
        }
        let _in_flight = InFlight(&self.in_flight);
        let mut engine = self.engine.lock().await;
        Ok(engine.tick())
    }

    /// Tick every `period` until the returned handle is stopped.
    pub fn spawn(&self, period: Duration) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let shared = self.clone();

        let task = tokio::spawn(async move {
            let mut stats = SchedulerStats::default();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(?period, "reconciliation scheduler started");

            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match shared.tick().await {
                            Ok(report) => {
                                stats.ticks_run += 1;
                                stats.step_failures += report.failures.len() as u64;
                            }
                            Err(StakeflowError::TickSkipped) => stats.ticks_skipped += 1,
                            Err(err) => tracing::error!(error = %err, "scheduled tick failed"),
                        }
                    }
                }
            }

            tracing::info!(
                ticks_run = stats.ticks_run,
                ticks_skipped = stats.ticks_skipped,
                "reconciliation scheduler stopped"
            );
            stats
        });

        SchedulerHandle { stop: stop_tx, task }
    }
}

/// Counters reported when the scheduler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks_run: u64,
    pub ticks_skipped: u64,
    pub step_failures: u64,
}

pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<SchedulerStats>,
}

impl SchedulerHandle {
    /// Stop the loop after any in-flight tick and wait for it.
    ///
    /// # Errors
    /// `Internal` if the scheduler task panicked.
    pub async fn stop(self) -> Result<SchedulerStats> {
        // The receiver lives in the task; a send error means it already ended.
        let _ = self.stop.send(true);
        self.task
            .await
            .map_err(|e| StakeflowError::Internal(format!("scheduler task: {e}")))
    }
}
