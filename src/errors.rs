// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::transport::RejectReason;
use crate::types::{JobId, NodeId, ProcessState, Rank};

#[derive(Error, Debug)]
pub enum LaunchError {
    /// Malformed launch request (caller error, never retried).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    #[error("Unknown rank {rank} in {job}")]
    UnknownRank { job: JobId, rank: Rank },

    #[error("Spawn of rank {rank} on node '{node}' rejected: {reason}")]
    SpawnRejected {
        rank: Rank,
        node: NodeId,
        reason: RejectReason,
    },

    #[error("Invalid transition for rank {rank} of {job}: {from} -> {to}")]
    InvalidTransition {
        job: JobId,
        rank: Rank,
        from: ProcessState,
        to: ProcessState,
    },

    #[error("{0} is not complete yet")]
    JobNotComplete(JobId),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, LaunchError>;
