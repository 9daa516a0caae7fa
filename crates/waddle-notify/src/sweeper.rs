//! Periodic retry sweeps.
//!
//! The sweeper replays every backlog on a fixed interval. Sweeps never
//! overlap: the timer loop awaits each sweep before waiting for the next
//! tick (late ticks are skipped, not bunched), and an in-progress flag makes
//! an on-demand [`Sweeper::sweep_now`] that races a running sweep return
//! `None` instead of replaying the same backlog twice.
//!
//! The interval runs on tokio's timer, so tests drive it deterministically
//! with `tokio::time::pause` and `tokio::time::advance`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::retry::{RetryEngine, SweepReport};

/// Runs [`RetryEngine::retry_all`] on a schedule.
#[derive(Debug)]
pub struct Sweeper {
    retry: Arc<RetryEngine>,
    interval: Duration,
    running: AtomicBool,
    completed: AtomicU64,
}

/// Clears the in-progress flag even if the sweep panics.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Sweeper {
    /// Create a sweeper with the given period.
    pub fn new(retry: Arc<RetryEngine>, interval: Duration) -> Self {
        Self {
            retry,
            interval,
            running: AtomicBool::new(false),
            completed: AtomicU64::new(0),
        }
    }

    /// Number of sweeps that have run to completion.
    pub fn completed_sweeps(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Whether a sweep is running right now.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one sweep immediately.
    ///
    /// Returns `None` without doing anything if another sweep is in progress.
    pub async fn sweep_now(&self) -> Option<SweepReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sweep already in progress, skipping");
            return None;
        }
        let _guard = SweepGuard(&self.running);

        let report = self.retry.retry_all().await;
        self.completed.fetch_add(1, Ordering::AcqRel);
        Some(report)
    }

    /// Start the background sweep loop.
    ///
    /// The first sweep fires one full interval after start. The loop exits at
    /// the next tick boundary once `shutdown` is cancelled; a sweep already
    /// running is allowed to finish.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> SweeperHandle {
        let sweeper = self;
        let handle = tokio::spawn(async move {
            let period = sweeper.interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(interval = ?period, "Retry sweeper started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Some(report) = sweeper.sweep_now().await {
                            if !report.is_empty() {
                                debug!(
                                    clients = report.clients.len(),
                                    remaining = report.total_pending,
                                    "Periodic sweep finished"
                                );
                            }
                        }
                    }
                }
            }

            debug!("Retry sweeper stopped");
        });

        SweeperHandle { handle }
    }
}

/// Handle to a running sweep loop.
#[derive(Debug)]
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Wait for the sweep loop to exit.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.handle.await
    }
}
