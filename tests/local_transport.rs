// tests/local_transport.rs

#![cfg(unix)]

mod common;
use crate::common::{init_tracing, with_timeout};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use proclaunch::engine::{CoordinatorOptions, CoordinatorState, LaunchCoordinator, LaunchRequest};
use proclaunch::errors::LaunchError;
use proclaunch::events::{EventCollector, NodeEventKind, event_channel};
use proclaunch::job::JobRegistry;
use proclaunch::transport::{
    LaunchTransport, LocalProcessTransport, NodeSlots, RejectReason, SpawnRequest,
};
use proclaunch::types::{ExecutableDescriptor, JobId};

fn nodes(entries: &[(&str, Option<usize>)]) -> BTreeMap<String, NodeSlots> {
    entries
        .iter()
        .map(|(name, limit)| (name.to_string(), NodeSlots { limit: *limit }))
        .collect()
}

fn request(rank: usize, node: &str, exe: ExecutableDescriptor) -> SpawnRequest {
    SpawnRequest {
        job: JobId::new(1),
        rank,
        node: node.to_string(),
        executable: Arc::new(exe),
    }
}

#[tokio::test]
async fn spawned_process_reports_start_and_exit_code() {
    init_tracing();
    let (tx, mut rx) = event_channel(16);
    let transport = LocalProcessTransport::new(nodes(&[("local", None)]), tx);

    let exe = ExecutableDescriptor::new("sh").with_args(["-c", "exit 3"]);
    transport.spawn(request(0, "local", exe)).await.unwrap();

    let started = with_timeout(rx.recv()).await.unwrap();
    assert_eq!(started.kind, NodeEventKind::Started);
    let exited = with_timeout(rx.recv()).await.unwrap();
    assert_eq!(exited.kind, NodeEventKind::Exited { code: 3 });
    assert_eq!(exited.rank, 0);
}

#[tokio::test]
async fn unknown_node_is_unreachable() {
    let (tx, _rx) = event_channel(16);
    let transport = LocalProcessTransport::new(nodes(&[("local", None)]), tx);

    let err = transport
        .spawn(request(0, "elsewhere", ExecutableDescriptor::new("true")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LaunchError::SpawnRejected {
            reason: RejectReason::NodeUnreachable,
            ..
        }
    ));
}

#[tokio::test]
async fn missing_executable_is_invalid() {
    let (tx, _rx) = event_channel(16);
    let transport = LocalProcessTransport::new(nodes(&[("local", None)]), tx);

    let exe = ExecutableDescriptor::new("/definitely/not/a/real/binary");
    let err = transport.spawn(request(0, "local", exe)).await.unwrap_err();
    assert!(matches!(
        err,
        LaunchError::SpawnRejected {
            reason: RejectReason::ExecutableInvalid(_),
            ..
        }
    ));
    assert_eq!(transport.slots_in_use("local"), 0);
}

#[tokio::test]
async fn full_node_rejects_until_a_slot_frees_up() {
    let (tx, mut rx) = event_channel(16);
    let transport = LocalProcessTransport::new(nodes(&[("small", Some(1))]), tx);

    let sleeper = ExecutableDescriptor::new("sleep").with_args(["30"]);
    transport
        .spawn(request(0, "small", sleeper.clone()))
        .await
        .unwrap();
    assert_eq!(transport.slots_in_use("small"), 1);

    let err = transport
        .spawn(request(1, "small", sleeper))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LaunchError::SpawnRejected {
            reason: RejectReason::ResourceExhausted,
            ..
        }
    ));

    // Terminating the job kills the sleeper and releases the slot.
    transport.terminate(JobId::new(1));
    let _started = with_timeout(rx.recv()).await.unwrap();
    with_timeout(async {
        while transport.slots_in_use("small") != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn end_to_end_mixed_exit_codes() {
    init_tracing();

    let registry = Arc::new(JobRegistry::new());
    let (tx, rx) = event_channel(64);
    let _collector = EventCollector::new(Arc::clone(&registry), 2).spawn(rx);
    let transport = Arc::new(LocalProcessTransport::new(nodes(&[("local", None)]), tx));
    let coordinator = LaunchCoordinator::new(
        Arc::clone(&registry),
        transport,
        CoordinatorOptions::default(),
    );

    // Rank 2 fails, everyone else succeeds.
    let exe = ExecutableDescriptor::new("sh")
        .with_args(["-c", r#"[ "$PROCLAUNCH_RANK" = "2" ] && exit 1; exit 0"#]);
    let job = coordinator
        .launch(LaunchRequest::new(
            vec!["local".to_string(); 3],
            exe,
            Duration::from_secs(5),
        ))
        .unwrap();

    let state = with_timeout(coordinator.wait(job)).await.unwrap();
    assert_eq!(state, CoordinatorState::PartialFailure);

    let summary = coordinator.reap(job).unwrap();
    assert_eq!(summary.exit_codes, vec![Some(0), Some(0), Some(1)]);
}
