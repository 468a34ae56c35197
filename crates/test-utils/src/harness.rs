use std::sync::Arc;

use proclaunch::engine::{CoordinatorOptions, LaunchCoordinator};
use proclaunch::events::{CollectorHandle, EventCollector, EventSender, event_channel};
use proclaunch::job::JobRegistry;

use crate::scripted_transport::ScriptedTransport;

/// Registry + collector + scripted transport + coordinator, wired the same
/// way `proclaunch::run` wires the real transport.
pub struct Harness {
    pub registry: Arc<JobRegistry>,
    pub transport: Arc<ScriptedTransport>,
    pub coordinator: LaunchCoordinator<ScriptedTransport>,
    pub collector: CollectorHandle,
    /// Extra sender for tests that inject node events directly.
    pub events: EventSender,
}

impl Harness {
    /// `script` receives a transport whose ranks all exit 0 and can adjust
    /// it before the coordinator is built.
    pub fn new<F>(options: CoordinatorOptions, script: F) -> Self
    where
        F: FnOnce(ScriptedTransport) -> ScriptedTransport,
    {
        let registry = Arc::new(JobRegistry::new());
        let (events, rx) = event_channel(256);
        let collector = EventCollector::new(Arc::clone(&registry), 4).spawn(rx);

        let transport = Arc::new(script(ScriptedTransport::new(events.clone())));
        let coordinator =
            LaunchCoordinator::new(Arc::clone(&registry), Arc::clone(&transport), options);

        Self {
            registry,
            transport,
            coordinator,
            collector,
            events,
        }
    }

    /// Default options, every rank exits 0.
    pub fn all_ok() -> Self {
        Self::new(CoordinatorOptions::default(), |t| t)
    }
}
