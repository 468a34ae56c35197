use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proclaunch::errors::{LaunchError, Result};
use proclaunch::events::{EventSender, NodeEvent};
use proclaunch::transport::{LaunchTransport, RejectReason, SpawnRequest, SpawnToken};
use proclaunch::types::{JobId, Rank};

/// What the fake node does with one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankScript {
    /// Accept, report a start, then an exit with this code.
    ExitWith(i32),
    /// Accept and report a start; the rank then runs until aborted.
    StartOnly,
    /// Accept, report a start, then lose contact.
    LostAfterStart,
    /// Accept but never report anything.
    Silent,
    /// Refuse the spawn.
    Reject(RejectReason),
    /// Never answer the spawn request at all.
    Hang,
}

/// A fake transport that:
/// - records every spawn request and terminate call
/// - answers each rank according to its [`RankScript`]
/// - pushes the scripted node events into the collector's ingress
/// - tracks how many spawn requests were in flight at once
pub struct ScriptedTransport {
    events: EventSender,
    default: RankScript,
    scripts: HashMap<Rank, RankScript>,
    spawn_delay: Option<Duration>,
    spawned: Arc<Mutex<Vec<(JobId, Rank)>>>,
    terminated: Arc<Mutex<Vec<JobId>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    /// Every rank exits 0 unless scripted otherwise.
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            default: RankScript::ExitWith(0),
            scripts: HashMap::new(),
            spawn_delay: None,
            spawned: Arc::new(Mutex::new(Vec::new())),
            terminated: Arc::new(Mutex::new(Vec::new())),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_default(mut self, script: RankScript) -> Self {
        self.default = script;
        self
    }

    pub fn with_rank(mut self, rank: Rank, script: RankScript) -> Self {
        self.scripts.insert(rank, script);
        self
    }

    /// Hold every spawn request open for `delay` before answering.
    pub fn with_spawn_delay(mut self, delay: Duration) -> Self {
        self.spawn_delay = Some(delay);
        self
    }

    /// `(job, rank)` of every spawn request received, in arrival order.
    pub fn spawned(&self) -> Vec<(JobId, Rank)> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<JobId> {
        self.terminated.lock().unwrap().clone()
    }

    /// Highest number of spawn requests observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn script_for(&self, rank: Rank) -> RankScript {
        self.scripts.get(&rank).cloned().unwrap_or_else(|| self.default.clone())
    }

    async fn answer(&self, request: SpawnRequest) -> Result<SpawnToken> {
        let SpawnRequest { job, rank, node, .. } = request;
        self.spawned.lock().unwrap().push((job, rank));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let script = self.script_for(rank);
        if script == RankScript::Hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.spawn_delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let send = |event: NodeEvent| {
            let tx = self.events.clone();
            async move {
                tx.send(event)
                    .await
                    .map_err(|_| LaunchError::ChannelClosed("node events"))
            }
        };

        match script {
            RankScript::Reject(reason) => {
                return Err(LaunchError::SpawnRejected { rank, node, reason });
            }
            RankScript::ExitWith(code) => {
                send(NodeEvent::started(job, rank)).await?;
                send(NodeEvent::exited(job, rank, code)).await?;
            }
            RankScript::StartOnly => {
                send(NodeEvent::started(job, rank)).await?;
            }
            RankScript::LostAfterStart => {
                send(NodeEvent::started(job, rank)).await?;
                send(NodeEvent::unreachable(job, rank)).await?;
            }
            RankScript::Silent | RankScript::Hang => {}
        }

        Ok(SpawnToken(rank as u64 + 1000))
    }
}

impl LaunchTransport for ScriptedTransport {
    fn spawn(
        &self,
        request: SpawnRequest,
    ) -> Pin<Box<dyn Future<Output = Result<SpawnToken>> + Send + '_>> {
        Box::pin(self.answer(request))
    }

    fn terminate(&self, job: JobId) {
        self.terminated.lock().unwrap().push(job);
    }
}
