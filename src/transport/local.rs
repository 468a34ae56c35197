// src/transport/local.rs

//! Transport that runs every rank as a child process of this host.
//!
//! Each configured node is a named slot pool. A spawn is rejected when the
//! node is not configured, when its slots are all taken, or when the
//! executable cannot be started. Accepted ranks are supervised by their own
//! Tokio task, which reports `Started` / `Exited` through the event ingress
//! and kills the child when the job is terminated.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::errors::{LaunchError, Result};
use crate::events::{EventSender, NodeEvent};
use crate::transport::{LaunchTransport, RejectReason, SpawnRequest, SpawnToken};
use crate::types::{JobId, NodeId, Rank};

/// Capacity of one local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeSlots {
    /// Maximum concurrently running ranks; `None` means unlimited.
    pub limit: Option<usize>,
}

#[derive(Debug, Default)]
struct LocalState {
    in_use: HashMap<NodeId, usize>,
    cancels: HashMap<JobId, HashMap<Rank, oneshot::Sender<()>>>,
}

/// Production transport backed by `tokio::process::Command`.
pub struct LocalProcessTransport {
    nodes: BTreeMap<NodeId, NodeSlots>,
    state: Arc<Mutex<LocalState>>,
    events: EventSender,
}

impl fmt::Debug for LocalProcessTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalProcessTransport")
            .field("nodes", &self.nodes)
            .finish_non_exhaustive()
    }
}

impl LocalProcessTransport {
    pub fn new(nodes: BTreeMap<NodeId, NodeSlots>, events: EventSender) -> Self {
        Self {
            nodes,
            state: Arc::new(Mutex::new(LocalState::default())),
            events,
        }
    }

    /// Ranks currently holding a slot on `node`.
    pub fn slots_in_use(&self, node: &str) -> usize {
        lock(&self.state).in_use.get(node).copied().unwrap_or(0)
    }

    fn reserve(&self, job: JobId, rank: Rank, node: &str) -> std::result::Result<RankGuard, RejectReason> {
        let slots = self.nodes.get(node).ok_or(RejectReason::NodeUnreachable)?;

        let mut state = lock(&self.state);
        let used = state.in_use.entry(node.to_string()).or_insert(0);
        if slots.limit.is_some_and(|limit| *used >= limit) {
            return Err(RejectReason::ResourceExhausted);
        }
        *used += 1;

        Ok(RankGuard {
            state: Arc::clone(&self.state),
            node: node.to_string(),
            job,
            rank,
        })
    }

    async fn spawn_rank(&self, request: SpawnRequest) -> Result<SpawnToken> {
        let SpawnRequest {
            job,
            rank,
            node,
            executable,
        } = request;
        let reject = |reason: RejectReason| LaunchError::SpawnRejected {
            rank,
            node: node.clone(),
            reason,
        };

        let guard = self.reserve(job, rank, &node).map_err(reject)?;

        let mut cmd = Command::new(&executable.program);
        cmd.args(&executable.args)
            .envs(&executable.env)
            .env("PROCLAUNCH_JOB", job.as_u64().to_string())
            .env("PROCLAUNCH_RANK", rank.to_string())
            .env("PROCLAUNCH_NODE", &node)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                return Err(reject(RejectReason::ExecutableInvalid(format!(
                    "'{}': {e}",
                    executable.program
                ))));
            }
            Err(e) => return Err(reject(RejectReason::Other(e.to_string()))),
        };

        let pid = child.id().unwrap_or_default();
        forward_output(job, rank, child.stdout.take(), child.stderr.take());

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        lock(&self.state)
            .cancels
            .entry(job)
            .or_default()
            .insert(rank, cancel_tx);

        info!(%job, rank, %node, pid, cmd = %executable, "rank process started");

        if self.events.send(NodeEvent::started(job, rank)).await.is_err() {
            warn!(%job, rank, "event ingress closed; start notice not delivered");
        }

        tokio::spawn(supervise(child, self.events.clone(), cancel_rx, guard));

        Ok(SpawnToken(u64::from(pid)))
    }
}

impl LaunchTransport for LocalProcessTransport {
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<SpawnToken>> + Send + '_>> {
        Box::pin(self.spawn_rank(request))
    }

    fn terminate(&self, job: JobId) {
        let cancels = lock(&self.state).cancels.remove(&job).unwrap_or_default();
        if cancels.is_empty() {
            debug!(%job, "terminate requested but no local processes are running");
            return;
        }

        info!(%job, processes = cancels.len(), "terminating local processes");
        for (rank, cancel) in cancels {
            if cancel.send(()).is_err() {
                debug!(%job, rank, "process already finished while terminating");
            }
        }
    }
}

fn lock(state: &Mutex<LocalState>) -> MutexGuard<'_, LocalState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds a node slot and the cancel registration of one rank; both are
/// released when the supervising task ends.
struct RankGuard {
    state: Arc<Mutex<LocalState>>,
    node: NodeId,
    job: JobId,
    rank: Rank,
}

impl Drop for RankGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.state);

        if let Some(used) = state.in_use.get_mut(&self.node) {
            *used = used.saturating_sub(1);
        }

        if let Some(ranks) = state.cancels.get_mut(&self.job) {
            ranks.remove(&self.rank);
            if ranks.is_empty() {
                state.cancels.remove(&self.job);
            }
        }
    }
}

/// Wait for the child to exit (reporting its code) or for a termination
/// request (killing it without reporting).
async fn supervise(
    mut child: Child,
    events: EventSender,
    mut cancel_rx: oneshot::Receiver<()>,
    guard: RankGuard,
) {
    let job = guard.job;
    let rank = guard.rank;

    tokio::select! {
        status = child.wait() => {
            let code = match status {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    error!(%job, rank, error = %e, "waiting for rank process failed");
                    -1
                }
            };

            info!(%job, rank, exit_code = code, "rank process exited");

            if events.send(NodeEvent::exited(job, rank, code)).await.is_err() {
                warn!(%job, rank, "event ingress closed; exit notice not delivered");
            }
        }

        cancel = &mut cancel_rx => {
            match cancel {
                Ok(()) => {
                    info!(%job, rank, "termination requested; killing rank process");
                    if let Err(e) = child.kill().await {
                        warn!(%job, rank, error = %e, "failed to kill rank process");
                    }
                }
                Err(_) => {
                    // Child is killed on drop (kill_on_drop).
                    debug!(%job, rank, "cancel handle dropped without a request");
                }
            }
        }
    }

    drop(guard);
}

/// Tag and forward the payload's stdout; keep stderr at debug so pipes
/// never fill up.
fn forward_output(
    job: JobId,
    rank: Rank,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) {
    if let Some(stdout) = stdout {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                println!("[{job},{rank}] {line}");
            }
        });
    }

    if let Some(stderr) = stderr {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(%job, rank, "stderr: {}", line);
            }
        });
    }
}
