// src/job/snapshot.rs

//! Read-only views handed out by the registry.

use std::fmt;

use crate::types::{JobId, ProcessState, Rank};

/// Number of ranks in each [`ProcessState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateCounts([usize; 6]);

impl StateCounts {
    /// Counts for a fresh job: every rank `Pending`.
    pub fn all_pending(total: usize) -> Self {
        let mut counts = [0; 6];
        counts[ProcessState::Pending.index()] = total;
        StateCounts(counts)
    }

    pub fn get(&self, state: ProcessState) -> usize {
        self.0[state.index()]
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn terminal(&self) -> usize {
        self.get(ProcessState::ExitedOk)
            + self.get(ProcessState::ExitedFail)
            + self.get(ProcessState::Lost)
    }

    pub fn is_complete(&self) -> bool {
        self.terminal() == self.total()
    }

    /// Move one rank from `from` to `to`.
    pub(crate) fn shift(&mut self, from: ProcessState, to: ProcessState) {
        self.0[from.index()] -= 1;
        self.0[to.index()] += 1;
    }
}

impl fmt::Display for StateCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for state in ProcessState::ALL {
            let n = self.get(state);
            if n == 0 {
                continue;
            }
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{state}={n}")?;
            first = false;
        }
        Ok(())
    }
}

/// Aggregate state of one job at a single point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub job: JobId,
    pub counts: StateCounts,
    /// Ranks that have not reached a terminal state, ascending.
    pub active_ranks: Vec<Rank>,
}

impl JobSnapshot {
    pub fn is_complete(&self) -> bool {
        self.active_ranks.is_empty()
    }
}

/// Final result of a reaped job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapSummary {
    pub job: JobId,
    /// Exit code per rank; `None` for ranks that were lost.
    pub exit_codes: Vec<Option<i32>>,
    /// Terminal state per rank.
    pub final_states: Vec<ProcessState>,
}

impl ReapSummary {
    pub fn all_ok(&self) -> bool {
        self.final_states
            .iter()
            .all(|s| *s == ProcessState::ExitedOk)
    }
}
