// src/types.rs

//! Identifiers and small value types shared by every layer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Dense zero-based index of one process within a job.
pub type Rank = usize;

/// Name of the node a rank is placed on.
pub type NodeId = String;

/// Identifier of one launched job.
///
/// Allocated by the [`JobRegistry`](crate::job::JobRegistry); never reused
/// within the lifetime of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub fn new(raw: u64) -> Self {
        JobId(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle state of a single rank.
///
/// Transitions only move forward:
/// `Pending -> Launched -> Running -> (ExitedOk | ExitedFail | Lost)`.
/// `Lost` can be reached from any non-terminal state, and `Launched` may
/// jump straight to an exit when the start notice was never observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Pending,
    Launched,
    Running,
    ExitedOk,
    ExitedFail,
    Lost,
}

impl ProcessState {
    /// Every state, in counter-slot order.
    pub const ALL: [ProcessState; 6] = [
        ProcessState::Pending,
        ProcessState::Launched,
        ProcessState::Running,
        ProcessState::ExitedOk,
        ProcessState::ExitedFail,
        ProcessState::Lost,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::ExitedOk | ProcessState::ExitedFail | ProcessState::Lost
        )
    }

    /// Position along the monotonic ordering. All terminal states share
    /// the last stage.
    pub fn stage(self) -> u8 {
        match self {
            ProcessState::Pending => 0,
            ProcessState::Launched => 1,
            ProcessState::Running => 2,
            ProcessState::ExitedOk | ProcessState::ExitedFail | ProcessState::Lost => 3,
        }
    }

    /// Slot of this state in a per-state counter array.
    pub fn index(self) -> usize {
        match self {
            ProcessState::Pending => 0,
            ProcessState::Launched => 1,
            ProcessState::Running => 2,
            ProcessState::ExitedOk => 3,
            ProcessState::ExitedFail => 4,
            ProcessState::Lost => 5,
        }
    }

    /// Whether `next` is directly reachable from `self`.
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;

        match (self, next) {
            (Pending, Launched) | (Pending, Lost) => true,
            (Launched, Running | ExitedOk | ExitedFail | Lost) => true,
            (Running, ExitedOk | ExitedFail | Lost) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Pending => "pending",
            ProcessState::Launched => "launched",
            ProcessState::Running => "running",
            ProcessState::ExitedOk => "exited_ok",
            ProcessState::ExitedFail => "exited_fail",
            ProcessState::Lost => "lost",
        };
        f.write_str(s)
    }
}

/// Whether the spawn fan-out limit is shared by all jobs of a coordinator
/// or applied to each job separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutScope {
    #[default]
    Job,
    Global,
}

impl FromStr for FanoutScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "job" => Ok(FanoutScope::Job),
            "global" => Ok(FanoutScope::Global),
            other => Err(format!(
                "invalid fanout_scope: {other} (expected \"job\" or \"global\")"
            )),
        }
    }
}

impl fmt::Display for FanoutScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanoutScope::Job => f.write_str("job"),
            FanoutScope::Global => f.write_str("global"),
        }
    }
}

/// What to run on each rank. Opaque to the coordinator; only transports
/// look inside.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutableDescriptor {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ExecutableDescriptor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Display for ExecutableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
