//! # Sweep Scheduler
//!
//! Drives the orchestrator on a fixed cadence: one sweep at startup, then one
//! per interval until shutdown. Sweeps run inline on the scheduler task, so
//! they never overlap; a sweep that outlasts the interval delays the next one.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::github::RepositoryId;
use crate::sync::{SweepReport, SyncOrchestrator};

pub struct SweepScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    repositories: Vec<RepositoryId>,
    interval: Duration,
}

impl SweepScheduler {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        repositories: Vec<RepositoryId>,
        interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            repositories,
            interval,
        }
    }

    /// Run a single sweep over every configured repository.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> SweepReport {
        let started = Instant::now();
        let report = self
            .orchestrator
            .run_sweep(&self.repositories, shutdown)
            .await;

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            pull_requests = report.pull_requests_synced(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sweep finished"
        );
        for (repo, reason) in &report.failed {
            warn!(repository = %repo, reason = %reason, "repository left for the next sweep");
        }

        report
    }

    /// Run sweeps until `shutdown` fires. Returns the number of sweeps started.
    #[instrument(skip_all, fields(interval_seconds = self.interval.as_secs()))]
    pub async fn run(self, shutdown: CancellationToken) -> u64 {
        info!(
            repositories = self.repositories.len(),
            "Starting sweep scheduler"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweeps = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Sweep scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    sweeps += 1;
                    let report = self.run_once(&shutdown).await;
                    if report.cancelled {
                        break;
                    }
                }
            }
        }

        info!(sweeps, "Sweep scheduler stopped");
        sweeps
    }
}
