// src/engine/mod.rs

//! Launch coordination engine.
//!
//! This module ties together:
//! - the pure coordinator state machine ([`core`])
//! - the per-job background driver that dispatches spawns and monitors the
//!   registry (`driver`)
//! - per-rank launch watchdogs ([`watchdog`])
//! - the public coordinator API: launch, status, abort, wait, reap
//!   ([`coordinator`])

pub mod coordinator;
pub mod core;
mod driver;
pub mod watchdog;

pub use coordinator::{CoordinatorOptions, JobStatus, LaunchCoordinator, LaunchRequest};
pub use self::core::{CoordinatorInput, CoordinatorState};
