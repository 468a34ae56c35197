// src/engine/driver.rs

//! Per-job background task: dispatch every rank, then monitor until the job
//! reaches a terminal state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::engine::core::{CoordinatorInput, CoordinatorState};
use crate::engine::watchdog::watch_rank;
use crate::errors::{LaunchError, Result};
use crate::job::JobRegistry;
use crate::transport::{LaunchTransport, SpawnRequest, SpawnToken};
use crate::types::{ExecutableDescriptor, JobId, NodeId, ProcessState, Rank};

/// Feed `input` into the state machine and publish the result.
///
/// Returns the state after the input. Runs under the watch channel's lock,
/// so concurrent callers (driver and abort) never interleave a
/// read-modify-write.
pub(crate) fn advance(
    state: &watch::Sender<CoordinatorState>,
    job: JobId,
    input: CoordinatorInput,
) -> CoordinatorState {
    let mut after = *state.borrow();

    state.send_if_modified(|current| {
        let next = current.on(input);
        after = next;
        if next == *current {
            return false;
        }
        info!(%job, from = %current, to = %next, "coordinator state changed");
        *current = next;
        true
    });

    after
}

/// Everything one job's background task needs.
pub(crate) struct JobDriver<T: LaunchTransport> {
    pub job: JobId,
    pub placement: Vec<NodeId>,
    pub executable: Arc<ExecutableDescriptor>,
    pub per_rank_timeout: Duration,
    pub registry: Arc<JobRegistry>,
    pub transport: Arc<T>,
    pub permits: Arc<Semaphore>,
    pub state: Arc<watch::Sender<CoordinatorState>>,
    pub abort: watch::Receiver<bool>,
}

impl<T: LaunchTransport> JobDriver<T> {
    pub async fn run(self) {
        let job = self.job;

        let mut changes = match self.registry.subscribe(job) {
            Ok(rx) => rx,
            Err(e) => {
                error!(%job, error = %e, "job vanished before dispatch");
                return;
            }
        };

        let mut watchdogs = JoinSet::new();
        self.dispatch_all(&mut watchdogs).await;
        advance(&self.state, job, CoordinatorInput::DispatchFinished);

        self.monitor(&mut changes).await;

        // Ranks that are still armed can no longer matter.
        watchdogs.abort_all();
        let final_state = *self.state.borrow();
        info!(%job, state = %final_state, "job driver finished");
    }

    /// Issue one spawn per rank, at most `permits` at a time.
    ///
    /// Returns once every rank has had its attempt (accepted or rejected) or
    /// the job was aborted.
    async fn dispatch_all(&self, watchdogs: &mut JoinSet<()>) {
        let job = self.job;
        let mut abort = self.abort.clone();
        let mut in_flight = JoinSet::new();

        info!(%job, ranks = self.placement.len(), "dispatching spawn requests");

        for (rank, node) in self.placement.iter().enumerate() {
            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        error!(%job, "fan-out semaphore closed; stopping dispatch");
                        break;
                    }
                },
                _ = abort.wait_for(|aborted| *aborted) => {
                    debug!(%job, rank, "abort observed; remaining ranks not dispatched");
                    break;
                }
            };

            // Mark the attempt before issuing it, so a start notice can never
            // overtake the Launched transition.
            if let Err(e) = self
                .registry
                .record_transition(job, rank, ProcessState::Launched, None)
            {
                debug!(%job, rank, error = %e, "rank not launchable; skipping");
                continue;
            }

            watchdogs.spawn(watch_rank(
                Arc::clone(&self.registry),
                job,
                rank,
                self.per_rank_timeout,
                self.abort.clone(),
            ));

            let request = SpawnRequest {
                job,
                rank,
                node: node.clone(),
                executable: Arc::clone(&self.executable),
            };
            let transport = Arc::clone(&self.transport);
            let registry = Arc::clone(&self.registry);
            let mut abort = self.abort.clone();
            let timeout = self.per_rank_timeout;

            // The permit is released when the transport answers, the job is
            // aborted, or the per-rank timeout runs out, whichever is first.
            in_flight.spawn(async move {
                let _permit = permit;
                tokio::select! {
                    result = tokio::time::timeout(timeout, transport.spawn(request)) => match result {
                        Ok(result) => settle_spawn(&registry, job, rank, result),
                        Err(_) => abandon_spawn(&registry, job, rank),
                    },
                    _ = abort.wait_for(|aborted| *aborted) => {
                        debug!(%job, rank, "abort observed while spawn in flight");
                    }
                }
            });
        }

        while let Some(res) = in_flight.join_next().await {
            if let Err(e) = res {
                warn!(%job, error = %e, "dispatch task ended abnormally");
            }
        }

        debug!(%job, "every rank had a dispatch attempt");
    }

    /// Re-check completion after every registry change until terminal.
    async fn monitor(&self, changes: &mut watch::Receiver<u64>) {
        let job = self.job;
        let mut abort = self.abort.clone();

        loop {
            if self.state.borrow().is_terminal() {
                break;
            }

            changes.mark_unchanged();
            match self.registry.snapshot(job) {
                Ok(snapshot) => {
                    debug!(%job, counts = %snapshot.counts, "job progress");
                    let state = advance(
                        &self.state,
                        job,
                        CoordinatorInput::Progress(snapshot.counts),
                    );
                    if state.is_terminal() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(%job, error = %e, "job left the registry while monitoring");
                    break;
                }
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                aborted = abort.wait_for(|aborted| *aborted) => {
                    if aborted.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// The transport never answered. A rank that already reported progress
/// keeps it; one that is still only `Launched` becomes lost.
fn abandon_spawn(registry: &JobRegistry, job: JobId, rank: Rank) {
    match registry.expire_if_silent(job, rank) {
        Ok(true) => warn!(%job, rank, "spawn request unanswered within the per-rank timeout; rank lost"),
        Ok(false) => debug!(%job, rank, "spawn request abandoned; rank already progressed"),
        Err(e) => debug!(%job, rank, error = %e, "spawn request abandoned"),
    }
}

/// Record the outcome of one spawn attempt.
fn settle_spawn(registry: &JobRegistry, job: JobId, rank: Rank, result: Result<SpawnToken>) {
    let reason = match result {
        Ok(token) => {
            debug!(%job, rank, %token, "spawn accepted");
            return;
        }
        Err(LaunchError::SpawnRejected { node, reason, .. }) => {
            warn!(%job, rank, %node, %reason, "spawn rejected; rank lost");
            reason.to_string()
        }
        Err(e) => {
            error!(%job, rank, error = %e, "transport failed; rank lost");
            e.to_string()
        }
    };

    if let Err(e) = registry.record_transition(job, rank, ProcessState::Lost, None) {
        debug!(%job, rank, %reason, error = %e, "rank already settled");
    }
}
