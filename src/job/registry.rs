// src/job/registry.rs

//! Single source of truth for every rank's state.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::{LaunchError, Result};
use crate::job::handle::ProcessHandle;
use crate::job::snapshot::{JobSnapshot, ReapSummary, StateCounts};
use crate::types::{JobId, NodeId, ProcessState, Rank};

/// State of one job: its handles plus incrementally maintained counters.
struct JobEntry {
    job: JobId,
    handles: Vec<ProcessHandle>,
    counts: StateCounts,
    /// Bumped after every successful transition.
    changes: watch::Sender<u64>,
}

impl JobEntry {
    fn apply(
        &mut self,
        rank: Rank,
        next: ProcessState,
        exit_code: Option<i32>,
        at: DateTime<Utc>,
    ) -> Result<ProcessState> {
        let handle = self
            .handles
            .get_mut(rank)
            .ok_or(LaunchError::UnknownRank {
                job: self.job,
                rank,
            })?;

        let prev = handle.state();
        handle.transition(next, exit_code, at)?;
        self.counts.shift(prev, next);
        self.changes.send_modify(|v| *v += 1);

        Ok(prev)
    }

    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job: self.job,
            counts: self.counts,
            active_ranks: self
                .handles
                .iter()
                .filter(|h| !h.is_terminal())
                .map(|h| h.rank())
                .collect(),
        }
    }
}

fn lock(entry: &Mutex<JobEntry>) -> MutexGuard<'_, JobEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the [`ProcessHandle`]s of every live job.
///
/// All mutation goes through the guarded methods below. Each job has its own
/// mutex, so work on different jobs never contends beyond the short map
/// lookup, and every read of one job observes a single consistent point in
/// time.
pub struct JobRegistry {
    next_id: AtomicU64,
    jobs: RwLock<HashMap<JobId, Arc<Mutex<JobEntry>>>>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of jobs currently held.
    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, job: JobId) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&job)
    }

    /// Allocate `process_count` handles in `Pending`, rank `i` placed on
    /// `placement[i]`.
    pub fn create_job(&self, process_count: usize, placement: Vec<NodeId>) -> Result<JobId> {
        if process_count == 0 {
            return Err(LaunchError::InvalidArgument(
                "process count must be at least 1".to_string(),
            ));
        }
        if placement.len() != process_count {
            return Err(LaunchError::InvalidArgument(format!(
                "placement plan has {} entries for {} processes",
                placement.len(),
                process_count
            )));
        }

        let job = JobId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handles = placement
            .into_iter()
            .enumerate()
            .map(|(rank, node)| ProcessHandle::new(job, rank, node))
            .collect();
        let (changes, _) = watch::channel(0);

        let entry = JobEntry {
            job,
            handles,
            counts: StateCounts::all_pending(process_count),
            changes,
        };

        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job, Arc::new(Mutex::new(entry)));

        info!(%job, process_count, "job created");
        Ok(job)
    }

    fn entry(&self, job: JobId) -> Result<Arc<Mutex<JobEntry>>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job)
            .cloned()
            .ok_or(LaunchError::UnknownJob(job))
    }

    /// Apply one transition to one rank, stamped with the current time.
    pub fn record_transition(
        &self,
        job: JobId,
        rank: Rank,
        next: ProcessState,
        exit_code: Option<i32>,
    ) -> Result<()> {
        self.record_transition_at(job, rank, next, exit_code, Utc::now())
    }

    /// Apply one transition to one rank with an explicit timestamp.
    pub fn record_transition_at(
        &self,
        job: JobId,
        rank: Rank,
        next: ProcessState,
        exit_code: Option<i32>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = self.entry(job)?;
        let mut entry = lock(&entry);
        let prev = entry.apply(rank, next, exit_code, at)?;

        debug!(%job, rank, from = %prev, to = %next, ?exit_code, "rank transition");
        Ok(())
    }

    /// Mark `rank` `Lost` if it is still `Launched`.
    ///
    /// Returns whether the rank was expired. The check and the transition
    /// happen under the job lock, so a start notice racing the watchdog is
    /// never overwritten.
    pub fn expire_if_silent(&self, job: JobId, rank: Rank) -> Result<bool> {
        let entry = self.entry(job)?;
        let mut entry = lock(&entry);

        let state = entry
            .handles
            .get(rank)
            .map(|h| h.state())
            .ok_or(LaunchError::UnknownRank { job, rank })?;

        if state != ProcessState::Launched {
            return Ok(false);
        }

        entry.apply(rank, ProcessState::Lost, None, Utc::now())?;
        warn!(%job, rank, "no start notice within the per-rank timeout; rank lost");
        Ok(true)
    }

    /// Mark every non-terminal rank `Lost`. Returns how many were affected.
    pub fn abort(&self, job: JobId) -> Result<usize> {
        let entry = self.entry(job)?;
        let mut entry = lock(&entry);
        let now = Utc::now();

        let active: Vec<Rank> = entry
            .handles
            .iter()
            .filter(|h| !h.is_terminal())
            .map(|h| h.rank())
            .collect();

        for rank in &active {
            entry.apply(*rank, ProcessState::Lost, None, now)?;
        }

        info!(%job, lost = active.len(), "job aborted");
        Ok(active.len())
    }

    /// Aggregate counts plus the list of non-terminal ranks.
    pub fn snapshot(&self, job: JobId) -> Result<JobSnapshot> {
        let entry = self.entry(job)?;
        let entry = lock(&entry);
        Ok(entry.snapshot())
    }

    /// True iff every rank is terminal.
    pub fn is_complete(&self, job: JobId) -> Result<bool> {
        let entry = self.entry(job)?;
        let entry = lock(&entry);
        Ok(entry.counts.is_complete())
    }

    /// Copies of every handle of the job, ordered by rank.
    pub fn handles(&self, job: JobId) -> Result<Vec<ProcessHandle>> {
        let entry = self.entry(job)?;
        let entry = lock(&entry);
        Ok(entry.handles.clone())
    }

    /// State of every rank, ordered by rank.
    pub fn rank_states(&self, job: JobId) -> Result<Vec<ProcessState>> {
        let entry = self.entry(job)?;
        let entry = lock(&entry);
        Ok(entry.handles.iter().map(|h| h.state()).collect())
    }

    pub fn state_of(&self, job: JobId, rank: Rank) -> Result<ProcessState> {
        let entry = self.entry(job)?;
        let entry = lock(&entry);
        entry
            .handles
            .get(rank)
            .map(|h| h.state())
            .ok_or(LaunchError::UnknownRank { job, rank })
    }

    /// Receiver that changes after every transition of the job. It closes
    /// once the job is reaped.
    pub fn subscribe(&self, job: JobId) -> Result<watch::Receiver<u64>> {
        let entry = self.entry(job)?;
        let entry = lock(&entry);
        Ok(entry.changes.subscribe())
    }

    /// Remove a complete job and return its per-rank results.
    pub fn reap(&self, job: JobId) -> Result<ReapSummary> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);

        let entry = jobs.get(&job).ok_or(LaunchError::UnknownJob(job))?;
        let summary = {
            let entry = lock(entry);
            if !entry.counts.is_complete() {
                return Err(LaunchError::JobNotComplete(job));
            }
            ReapSummary {
                job,
                exit_codes: entry.handles.iter().map(|h| h.exit_code()).collect(),
                final_states: entry.handles.iter().map(|h| h.state()).collect(),
            }
        };

        jobs.remove(&job);
        info!(%job, "job reaped");
        Ok(summary)
    }
}
