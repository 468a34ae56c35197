// src/transport/mod.rs

//! Launch transport abstraction.
//!
//! The coordinator talks to a [`LaunchTransport`] instead of a concrete
//! remote-execution mechanism. Production code uses
//! [`LocalProcessTransport`], which runs every rank as a child process of
//! this host; tests swap in scripted transports that never spawn anything.
//!
//! A transport answers each [`SpawnRequest`] with either a [`SpawnToken`] or
//! a `SpawnRejected` error. It never retries on its own. Everything that
//! happens after acceptance (start, exit, loss of contact) is reported
//! asynchronously as [`NodeEvent`](crate::events::NodeEvent)s.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::Result;
use crate::types::{ExecutableDescriptor, JobId, NodeId, Rank};

pub mod local;

pub use local::{LocalProcessTransport, NodeSlots};

/// Instruction to start one rank on one node.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub job: JobId,
    pub rank: Rank,
    pub node: NodeId,
    pub executable: Arc<ExecutableDescriptor>,
}

/// Opaque, pid-like token returned for an accepted spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpawnToken(pub u64);

impl fmt::Display for SpawnToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a node refused a spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NodeUnreachable,
    ResourceExhausted,
    ExecutableInvalid(String),
    Other(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NodeUnreachable => f.write_str("node unreachable"),
            RejectReason::ResourceExhausted => f.write_str("node resources exhausted"),
            RejectReason::ExecutableInvalid(msg) => write!(f, "executable invalid: {msg}"),
            RejectReason::Other(msg) => f.write_str(msg),
        }
    }
}

/// Trait abstracting how spawn requests reach nodes.
pub trait LaunchTransport: Send + Sync + 'static {
    /// Deliver one spawn request and report acceptance or rejection.
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<SpawnToken>> + Send + '_>>;

    /// Best-effort teardown of everything this transport started for `job`.
    ///
    /// Called on abort. Transports that cannot reach their processes keep the
    /// default no-op; the registry marks the ranks lost either way.
    fn terminate(&self, _job: JobId) {}
}
