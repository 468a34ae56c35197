// src/events/mod.rs

//! Asynchronous lifecycle notifications from nodes.
//!
//! Transports (or any remote-execution collaborator) push [`NodeEvent`]s
//! into an [`EventSender`]; the [`collector`] drains that queue and turns
//! each event into one registry transition.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::types::{JobId, ProcessState, Rank};

pub mod collector;

pub use collector::{CollectorCounts, CollectorHandle, EventCollector};

/// Sending half of the node-event ingress queue.
pub type EventSender = mpsc::Sender<NodeEvent>;

/// Receiving half of the node-event ingress queue.
pub type EventReceiver = mpsc::Receiver<NodeEvent>;

/// Create the ingress queue with room for `capacity` undelivered events.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity)
}

/// What happened to a remote process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    /// The process is up and running on its node.
    Started,
    /// The process exited with the given code.
    Exited { code: i32 },
    /// The node stopped answering for this process.
    Unreachable,
}

impl NodeEventKind {
    /// Registry state this event moves the rank to.
    pub fn target_state(self) -> ProcessState {
        match self {
            NodeEventKind::Started => ProcessState::Running,
            NodeEventKind::Exited { code: 0 } => ProcessState::ExitedOk,
            NodeEventKind::Exited { .. } => ProcessState::ExitedFail,
            NodeEventKind::Unreachable => ProcessState::Lost,
        }
    }

    pub fn exit_code(self) -> Option<i32> {
        match self {
            NodeEventKind::Exited { code } => Some(code),
            _ => None,
        }
    }
}

/// One lifecycle notification for one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub job: JobId,
    pub rank: Rank,
    pub kind: NodeEventKind,
    pub timestamp: DateTime<Utc>,
}

impl NodeEvent {
    pub fn new(job: JobId, rank: Rank, kind: NodeEventKind) -> Self {
        Self {
            job,
            rank,
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn started(job: JobId, rank: Rank) -> Self {
        Self::new(job, rank, NodeEventKind::Started)
    }

    pub fn exited(job: JobId, rank: Rank, code: i32) -> Self {
        Self::new(job, rank, NodeEventKind::Exited { code })
    }

    pub fn unreachable(job: JobId, rank: Rank) -> Self {
        Self::new(job, rank, NodeEventKind::Unreachable)
    }
}
