// src/engine/coordinator.rs

//! Async shell around the coordinator state machine.
//!
//! [`LaunchCoordinator`] accepts launch requests, starts one background
//! `JobDriver` per job and answers status / abort / wait / reap calls. The
//! semantics of each phase live in [`core`](crate::engine::core); this file
//! only wires channels, tasks and the registry together.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::core::{CoordinatorInput, CoordinatorState};
use crate::engine::driver::{JobDriver, advance};
use crate::errors::{LaunchError, Result};
use crate::job::{JobRegistry, ReapSummary};
use crate::transport::LaunchTransport;
use crate::types::{ExecutableDescriptor, FanoutScope, JobId, NodeId, ProcessState, Rank};

/// Tunables shared by every job of one coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Maximum spawn requests in flight; `1` dispatches sequentially.
    pub fanout_limit: usize,
    /// Whether `fanout_limit` applies per job or across all jobs.
    pub fanout_scope: FanoutScope,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            fanout_limit: 16,
            fanout_scope: FanoutScope::Job,
        }
    }
}

/// Request to launch `process_count` ranks.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub process_count: usize,
    /// Node of each rank; `placement[i]` hosts rank `i`.
    pub placement: Vec<NodeId>,
    pub executable: ExecutableDescriptor,
    /// Silence allowed between `Launched` and the first start or exit
    /// notice before a rank is declared lost.
    pub per_rank_timeout: Duration,
}

impl LaunchRequest {
    /// One rank per placement entry.
    pub fn new(
        placement: Vec<NodeId>,
        executable: ExecutableDescriptor,
        per_rank_timeout: Duration,
    ) -> Self {
        Self {
            process_count: placement.len(),
            placement,
            executable,
            per_rank_timeout,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.process_count == 0 {
            return Err(LaunchError::InvalidArgument(
                "process count must be at least 1".to_string(),
            ));
        }
        if self.placement.len() != self.process_count {
            return Err(LaunchError::InvalidArgument(format!(
                "placement plan has {} entries for {} processes",
                self.placement.len(),
                self.process_count
            )));
        }
        if self.per_rank_timeout.is_zero() {
            return Err(LaunchError::InvalidArgument(
                "per-rank timeout must be greater than zero".to_string(),
            ));
        }
        if self.executable.program.trim().is_empty() {
            return Err(LaunchError::InvalidArgument(
                "executable program must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub job: JobId,
    pub state: CoordinatorState,
    pub rank_states: Vec<ProcessState>,
    /// Exit codes of terminal ranks only; `None` for lost ranks.
    pub exit_codes: BTreeMap<Rank, Option<i32>>,
}

struct JobControl {
    state: Arc<watch::Sender<CoordinatorState>>,
    abort: watch::Sender<bool>,
    driver: JoinHandle<()>,
}

/// Drives launch → monitor → reap for any number of jobs.
pub struct LaunchCoordinator<T: LaunchTransport> {
    registry: Arc<JobRegistry>,
    transport: Arc<T>,
    options: CoordinatorOptions,
    global_permits: Arc<Semaphore>,
    jobs: Mutex<HashMap<JobId, JobControl>>,
}

impl<T: LaunchTransport> fmt::Debug for LaunchCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchCoordinator")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T: LaunchTransport> LaunchCoordinator<T> {
    pub fn new(registry: Arc<JobRegistry>, transport: Arc<T>, options: CoordinatorOptions) -> Self {
        let fanout_limit = options.fanout_limit.max(1);
        Self {
            registry,
            transport,
            options: CoordinatorOptions {
                fanout_limit,
                ..options
            },
            global_permits: Arc::new(Semaphore::new(fanout_limit)),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn options(&self) -> CoordinatorOptions {
        self.options
    }

    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<JobId, JobControl>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate `request`, create the job and start dispatching it in the
    /// background. Must be called from within a Tokio runtime.
    pub fn launch(&self, request: LaunchRequest) -> Result<JobId> {
        request.validate()?;

        let LaunchRequest {
            process_count,
            placement,
            executable,
            per_rank_timeout,
        } = request;

        let job = self.registry.create_job(process_count, placement.clone())?;

        let (state, _) = watch::channel(CoordinatorState::CollectingRequest);
        let state = Arc::new(state);
        advance(&state, job, CoordinatorInput::RequestAccepted);

        let (abort_tx, abort_rx) = watch::channel(false);

        let permits = match self.options.fanout_scope {
            FanoutScope::Global => Arc::clone(&self.global_permits),
            FanoutScope::Job => Arc::new(Semaphore::new(self.options.fanout_limit)),
        };

        info!(
            %job,
            process_count,
            cmd = %executable,
            timeout = ?per_rank_timeout,
            fanout = self.options.fanout_limit,
            scope = ?self.options.fanout_scope,
            "launching job"
        );

        let driver = JobDriver {
            job,
            placement,
            executable: Arc::new(executable),
            per_rank_timeout,
            registry: Arc::clone(&self.registry),
            transport: Arc::clone(&self.transport),
            permits,
            state: Arc::clone(&state),
            abort: abort_rx,
        };
        let driver = tokio::spawn(driver.run());

        self.lock_jobs().insert(
            job,
            JobControl {
                state,
                abort: abort_tx,
                driver,
            },
        );

        Ok(job)
    }

    /// Current coordinator state of `job`.
    pub fn state(&self, job: JobId) -> Result<CoordinatorState> {
        let jobs = self.lock_jobs();
        let control = jobs.get(&job).ok_or(LaunchError::UnknownJob(job))?;
        let state = *control.state.borrow();
        Ok(state)
    }

    pub fn status(&self, job: JobId) -> Result<JobStatus> {
        let state = self.state(job)?;
        let handles = self.registry.handles(job)?;

        let exit_codes = handles
            .iter()
            .filter(|h| h.is_terminal())
            .map(|h| (h.rank(), h.exit_code()))
            .collect();

        Ok(JobStatus {
            job,
            state,
            rank_states: handles.iter().map(|h| h.state()).collect(),
            exit_codes,
        })
    }

    /// Stop `job`: every non-terminal rank becomes lost and the job ends
    /// `Aborted`. Aborting an already finished job is a no-op.
    pub fn abort(&self, job: JobId) -> Result<()> {
        {
            let jobs = self.lock_jobs();
            let control = jobs.get(&job).ok_or(LaunchError::UnknownJob(job))?;

            // State first, so the driver cannot conclude PartialFailure from
            // the Lost ranks written below.
            let state = advance(&control.state, job, CoordinatorInput::AbortRequested);
            if state != CoordinatorState::Aborted {
                debug!(%job, %state, "abort ignored; job already finished");
                return Ok(());
            }
            control.abort.send_replace(true);
        }

        self.registry.abort(job)?;
        self.transport.terminate(job);
        Ok(())
    }

    /// Wait until `job` reaches a terminal coordinator state.
    pub async fn wait(&self, job: JobId) -> Result<CoordinatorState> {
        let mut rx = {
            let jobs = self.lock_jobs();
            let control = jobs.get(&job).ok_or(LaunchError::UnknownJob(job))?;
            control.state.subscribe()
        };

        let state = rx
            .wait_for(|state| state.is_terminal())
            .await
            .map_err(|_| LaunchError::ChannelClosed("coordinator state"))?;
        Ok(*state)
    }

    /// Dispose of a finished job and return its per-rank exit codes.
    pub fn reap(&self, job: JobId) -> Result<ReapSummary> {
        let mut jobs = self.lock_jobs();
        let control = jobs.get(&job).ok_or(LaunchError::UnknownJob(job))?;

        if !control.state.borrow().is_terminal() {
            return Err(LaunchError::JobNotComplete(job));
        }

        let summary = self.registry.reap(job)?;
        if let Some(control) = jobs.remove(&job) {
            control.driver.abort();
        }

        Ok(summary)
    }
}
