// src/engine/core.rs

//! Pure coordinator state machine.
//!
//! This module contains a synchronous, deterministic description of how a
//! job moves through the launch protocol. It has no channels, no Tokio
//! types and performs no IO; the async shell in
//! [`coordinator`](crate::engine::coordinator) feeds it inputs and publishes
//! the resulting state.

use std::fmt;

use crate::job::StateCounts;
use crate::types::ProcessState;

/// Phase of one job as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinatorState {
    /// Waiting for a launch request and placement plan.
    CollectingRequest,
    /// Spawn requests are being issued.
    Dispatching,
    /// Every rank had a dispatch attempt; waiting for them to finish.
    Monitoring,
    /// All ranks terminal, at least one failed or lost.
    PartialFailure,
    /// All ranks exited successfully.
    Complete,
    /// Stopped by an explicit abort request.
    Aborted,
}

impl CoordinatorState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CoordinatorState::PartialFailure | CoordinatorState::Complete | CoordinatorState::Aborted
        )
    }

    /// Compute the state after `input`.
    ///
    /// Terminal states absorb every input. Inputs that do not apply to the
    /// current phase leave it unchanged.
    pub fn on(self, input: CoordinatorInput) -> CoordinatorState {
        use CoordinatorState::*;

        if self.is_terminal() {
            return self;
        }

        match (self, input) {
            (_, CoordinatorInput::AbortRequested) => Aborted,
            (CollectingRequest, CoordinatorInput::RequestAccepted) => Dispatching,
            (Dispatching, CoordinatorInput::DispatchFinished) => Monitoring,
            (Monitoring, CoordinatorInput::Progress(counts)) => outcome_of(&counts).unwrap_or(Monitoring),
            (state, _) => state,
        }
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoordinatorState::CollectingRequest => "collecting_request",
            CoordinatorState::Dispatching => "dispatching",
            CoordinatorState::Monitoring => "monitoring",
            CoordinatorState::PartialFailure => "partial_failure",
            CoordinatorState::Complete => "complete",
            CoordinatorState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Inputs that drive [`CoordinatorState::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorInput {
    /// The launch request was validated and the job created.
    RequestAccepted,
    /// Every rank has received a dispatch attempt.
    DispatchFinished,
    /// The registry changed; these are the current per-state counts.
    Progress(StateCounts),
    /// An external abort request arrived.
    AbortRequested,
}

/// Final outcome for a job whose ranks are all terminal, or `None` while
/// any rank is still active.
fn outcome_of(counts: &StateCounts) -> Option<CoordinatorState> {
    if !counts.is_complete() {
        return None;
    }

    if counts.get(ProcessState::ExitedOk) == counts.total() {
        Some(CoordinatorState::Complete)
    } else {
        Some(CoordinatorState::PartialFailure)
    }
}
