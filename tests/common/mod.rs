#![allow(dead_code)]

use std::time::Duration;

use proclaunch::job::JobRegistry;
use proclaunch::types::{JobId, ProcessState, Rank};

pub use proclaunch_test_utils::{init_tracing, with_timeout};

/// Poll the registry until `rank` of `job` is in `state`.
///
/// Panics after five seconds of (possibly paused) time.
pub async fn wait_for_rank(registry: &JobRegistry, job: JobId, rank: Rank, state: ProcessState) {
    with_timeout(async {
        loop {
            if registry.state_of(job, rank).ok() == Some(state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

/// Poll until every rank of `job` is terminal.
pub async fn wait_until_complete(registry: &JobRegistry, job: JobId) {
    with_timeout(async {
        loop {
            if registry.is_complete(job).unwrap_or(false) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}
