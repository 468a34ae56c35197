// src/job/handle.rs

//! Per-rank process record.

use chrono::{DateTime, Utc};

use crate::errors::{LaunchError, Result};
use crate::types::{JobId, NodeId, ProcessState, Rank};

/// In-memory record of one spawned (or to-be-spawned) process.
///
/// Handles live inside the [`JobRegistry`](crate::job::JobRegistry); callers
/// outside the registry only ever see clones.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessHandle {
    job: JobId,
    rank: Rank,
    node: NodeId,
    state: ProcessState,
    exit_code: Option<i32>,
    launched_at: Option<DateTime<Utc>>,
    terminated_at: Option<DateTime<Utc>>,
}

impl ProcessHandle {
    pub fn new(job: JobId, rank: Rank, node: NodeId) -> Self {
        Self {
            job,
            rank,
            node,
            state: ProcessState::Pending,
            exit_code: None,
            launched_at: None,
            terminated_at: None,
        }
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Exit code; only ever `Some` in `ExitedOk` / `ExitedFail`.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn launched_at(&self) -> Option<DateTime<Utc>> {
        self.launched_at
    }

    pub fn terminated_at(&self) -> Option<DateTime<Utc>> {
        self.terminated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `next`, or fail with `InvalidTransition` leaving the handle
    /// untouched.
    ///
    /// `exit_code` is recorded only for `ExitedOk` (defaulting to 0) and
    /// `ExitedFail`; it is ignored for every other target.
    pub fn transition(
        &mut self,
        next: ProcessState,
        exit_code: Option<i32>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(LaunchError::InvalidTransition {
                job: self.job,
                rank: self.rank,
                from: self.state,
                to: next,
            });
        }

        match next {
            ProcessState::Launched => {
                self.launched_at = Some(at);
            }
            ProcessState::ExitedOk => {
                self.exit_code = Some(exit_code.unwrap_or(0));
                self.terminated_at = Some(at);
            }
            ProcessState::ExitedFail => {
                self.exit_code = exit_code;
                self.terminated_at = Some(at);
            }
            ProcessState::Lost => {
                self.terminated_at = Some(at);
            }
            ProcessState::Pending | ProcessState::Running => {}
        }

        self.state = next;
        Ok(())
    }
}
