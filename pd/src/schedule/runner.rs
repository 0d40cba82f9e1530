//! Schedule loop: wait for each slot, post it, repeat until shutdown

use std::future::Future;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use eyre::{Context, Result, eyre};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{MAX_WAIT_SECS, WeeklySchedule};
use crate::orchestrator::Orchestrator;

/// How long to sleep before checking the clock again, `None` when `at` is due
///
/// Sleeps are capped at [`MAX_WAIT_SECS`] so clock changes and suspends are
/// noticed within a minute.
pub fn plan_wait(now: NaiveDateTime, at: NaiveDateTime) -> Option<Duration> {
    let remaining = (at - now).to_std().ok().filter(|d| !d.is_zero())?;
    Some(remaining.min(Duration::from_secs(MAX_WAIT_SECS)))
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Run scheduled uploads until `shutdown_rx` fires
///
/// A slot in progress is always finished before shutting down. Slots missed
/// while a long slot was running are skipped rather than posted in a burst.
pub async fn run(
    orchestrator: &Orchestrator,
    schedule: &WeeklySchedule,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    debug!(uploads_per_week = schedule.uploads_per_week(), "schedule::run: called");
    let mut cursor = local_now();

    loop {
        let Some(next) = schedule.next_slot_after(cursor) else {
            warn!("Nothing scheduled, waiting for shutdown");
            let _ = shutdown_rx.recv().await;
            return Ok(());
        };
        info!(at = %next.at, videos = ?next.slot.videos, "Next upload slot");

        while let Some(wait) = plan_wait(local_now(), next.at) {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested, scheduler stopping");
                    return Ok(());
                }
            }
        }

        let report = orchestrator.run_slot(&next.slot.videos, schedule.platforms()).await;
        for entry in report.failures() {
            match &entry.result {
                Err(e) if e.is_persistence_failure() => {
                    error!(video = %entry.video_id, error = %e, "Upload history not saved")
                }
                Err(e) => warn!(video = %entry.video_id, error = %e, "Scheduled upload failed"),
                Ok(outcome) => warn!(
                    video = %entry.video_id,
                    failed = outcome.results.iter().filter(|r| !r.succeeded).count(),
                    "Scheduled upload incomplete"
                ),
            }
        }

        cursor = next.at.max(local_now());
    }
}

/// Wait for `stop` or for the scheduler task to end, whichever is first
///
/// When `stop` fires, shutdown is sent and the task is awaited so the slot in
/// progress finishes. A task that ends on its own, fails or panics ends the
/// wait too, with its error.
pub async fn supervise(
    mut handle: JoinHandle<Result<()>>,
    shutdown_tx: mpsc::Sender<()>,
    stop: impl Future<Output = ()>,
) -> Result<()> {
    debug!("schedule::supervise: called");
    tokio::select! {
        _ = stop => {
            info!("Stopping scheduler");
            let _ = shutdown_tx.send(()).await;
            handle.await.context("Scheduler task failed")?
        }
        joined = &mut handle => {
            let result = joined.context("Scheduler task failed")?;
            match &result {
                Ok(()) => warn!("Scheduler task ended on its own"),
                Err(e) => error!(error = %e, "Scheduler task failed"),
            }
            result.and_then(|()| Err(eyre!("Scheduler stopped unexpectedly")))
        }
    }
}
