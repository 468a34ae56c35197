// src/engine/watchdog.rs

//! Per-rank launch watchdog.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::debug;

use crate::job::JobRegistry;
use crate::types::{JobId, Rank};

/// Wait `timeout`, then mark `rank` lost if it is still only `Launched`.
///
/// Returns early, without touching the registry, once `abort` flips to
/// `true` or its sender goes away. The check-and-expire is a single registry
/// call, so a start notice that lands at the same moment wins or loses
/// atomically.
pub async fn watch_rank(
    registry: Arc<JobRegistry>,
    job: JobId,
    rank: Rank,
    timeout: Duration,
    mut abort: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = sleep(timeout) => {
            match registry.expire_if_silent(job, rank) {
                Ok(true) => {}
                Ok(false) => debug!(%job, rank, "watchdog expired after rank progressed"),
                Err(e) => debug!(%job, rank, error = %e, "watchdog could not inspect rank"),
            }
        }
        _ = abort.wait_for(|aborted| *aborted) => {
            debug!(%job, rank, "watchdog disarmed by abort");
        }
    }
}
