// src/events/collector.rs

//! Event collector: single ingress, per-rank ordering, cross-rank
//! concurrency.
//!
//! The router task reads every [`NodeEvent`] from the ingress queue and
//! forwards it to one of `lanes` worker tasks, chosen by hashing
//! `(job, rank)`. Each lane applies its events strictly in arrival order, so
//! two events for the same rank are never reordered, while ranks that hash to
//! different lanes are processed concurrently.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::LaunchError;
use crate::events::{EventReceiver, NodeEvent};
use crate::job::JobRegistry;

/// Capacity of each lane's private queue.
const LANE_QUEUE_LENGTH: usize = 64;

/// Running totals kept by the collector.
#[derive(Debug, Default)]
struct CollectorStats {
    applied: AtomicU64,
    duplicates: AtomicU64,
    faults: AtomicU64,
    dropped: AtomicU64,
}

impl CollectorStats {
    fn counts(&self) -> CollectorCounts {
        CollectorCounts {
            applied: self.applied.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the collector's totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectorCounts {
    /// Events that produced a registry transition.
    pub applied: u64,
    /// Repeats of an already-applied or already-terminal state; ignored.
    pub duplicates: u64,
    /// Out-of-order transitions on a non-terminal rank.
    pub faults: u64,
    /// Events for jobs or ranks the registry does not know.
    pub dropped: u64,
}

/// Builder for the collector tasks.
#[derive(Debug)]
pub struct EventCollector {
    registry: Arc<JobRegistry>,
    lanes: usize,
}

impl EventCollector {
    /// `lanes` is clamped to at least one.
    pub fn new(registry: Arc<JobRegistry>, lanes: usize) -> Self {
        Self {
            registry,
            lanes: lanes.max(1),
        }
    }

    /// Start the router and lane tasks consuming `ingress`.
    ///
    /// The tasks run until every [`EventSender`](crate::events::EventSender)
    /// is dropped and the queue is drained.
    pub fn spawn(self, mut ingress: EventReceiver) -> CollectorHandle {
        let stats = Arc::new(CollectorStats::default());
        let lane_count = self.lanes;

        let mut lane_txs = Vec::with_capacity(lane_count);
        let mut lane_handles = Vec::with_capacity(lane_count);

        for lane in 0..lane_count {
            let (tx, mut rx) = mpsc::channel::<NodeEvent>(LANE_QUEUE_LENGTH);
            let registry = Arc::clone(&self.registry);
            let stats = Arc::clone(&stats);

            lane_handles.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    apply_event(&registry, &stats, event);
                }
                debug!(lane, "collector lane finished");
            }));
            lane_txs.push(tx);
        }

        let router = tokio::spawn(async move {
            info!(lanes = lane_count, "event collector started");

            while let Some(event) = ingress.recv().await {
                let lane = lane_for(&event, lane_count);
                if lane_txs[lane].send(event).await.is_err() {
                    error!(lane, "collector lane closed unexpectedly; stopping router");
                    break;
                }
            }

            // Closing the lane senders lets each lane drain and exit.
            drop(lane_txs);
            for handle in lane_handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "collector lane ended abnormally");
                }
            }

            info!("event collector finished (ingress closed)");
        });

        CollectorHandle { router, stats }
    }
}

/// Handle on a running collector.
#[derive(Debug)]
pub struct CollectorHandle {
    router: JoinHandle<()>,
    stats: Arc<CollectorStats>,
}

impl CollectorHandle {
    pub fn counts(&self) -> CollectorCounts {
        self.stats.counts()
    }

    /// Wait until the ingress is closed and every queued event is applied.
    pub async fn join(self) -> CollectorCounts {
        if let Err(e) = self.router.await {
            warn!(error = %e, "event collector task ended abnormally");
        }
        self.stats.counts()
    }

    /// Stop routing immediately. Events still queued are discarded.
    pub fn shutdown(self) {
        self.router.abort();
    }
}

fn lane_for(event: &NodeEvent, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    event.job.hash(&mut hasher);
    event.rank.hash(&mut hasher);
    (hasher.finish() % lanes as u64) as usize
}

/// Translate one event into exactly one registry transition.
fn apply_event(registry: &JobRegistry, stats: &CollectorStats, event: NodeEvent) {
    let target = event.kind.target_state();
    let exit_code = event.kind.exit_code();

    match registry.record_transition_at(event.job, event.rank, target, exit_code, event.timestamp)
    {
        Ok(()) => {
            stats.applied.fetch_add(1, Ordering::Relaxed);
        }
        Err(LaunchError::InvalidTransition { from, to, .. })
            if from.is_terminal() || from == to =>
        {
            stats.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(
                job = %event.job,
                rank = event.rank,
                state = %from,
                event = ?event.kind,
                ignored = %to,
                "duplicate or late event ignored"
            );
        }
        Err(err @ (LaunchError::UnknownJob(_) | LaunchError::UnknownRank { .. })) => {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                job = %event.job,
                rank = event.rank,
                error = %err,
                "event for unknown job or rank dropped"
            );
        }
        Err(err) => {
            stats.faults.fetch_add(1, Ordering::Relaxed);
            error!(
                job = %event.job,
                rank = event.rank,
                event = ?event.kind,
                error = %err,
                "lifecycle event violates rank ordering"
            );
        }
    }
}
