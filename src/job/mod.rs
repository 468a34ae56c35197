// src/job/mod.rs

//! Job state: per-rank handles and the registry that owns them.
//!
//! - [`handle`] holds the per-rank record and its guarded transition.
//! - [`registry`] owns every live job and is the only mutation path.
//! - [`snapshot`] defines the read-only views the registry hands out.

pub mod handle;
pub mod registry;
pub mod snapshot;

pub use handle::ProcessHandle;
pub use registry::JobRegistry;
pub use snapshot::{JobSnapshot, ReapSummary, StateCounts};
