// tests/job_registry.rs

use std::sync::Arc;
use std::thread;

use proclaunch::errors::LaunchError;
use proclaunch::job::JobRegistry;
use proclaunch::types::{JobId, ProcessState};

fn placement(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("node-{i}")).collect()
}

fn finish_ok(registry: &JobRegistry, job: JobId, rank: usize) {
    registry
        .record_transition(job, rank, ProcessState::Launched, None)
        .unwrap();
    registry
        .record_transition(job, rank, ProcessState::Running, None)
        .unwrap();
    registry
        .record_transition(job, rank, ProcessState::ExitedOk, Some(0))
        .unwrap();
}

#[test]
fn create_job_starts_every_rank_pending() {
    let registry = JobRegistry::new();
    let job = registry.create_job(4, placement(4)).unwrap();

    let snap = registry.snapshot(job).unwrap();
    assert_eq!(snap.counts.get(ProcessState::Pending), 4);
    assert_eq!(snap.counts.total(), 4);
    assert_eq!(snap.active_ranks, vec![0, 1, 2, 3]);
    assert!(!snap.is_complete());

    let handles = registry.handles(job).unwrap();
    assert_eq!(handles[2].node(), "node-2");
}

#[test]
fn job_ids_are_never_reused() {
    let registry = JobRegistry::new();
    let a = registry.create_job(1, placement(1)).unwrap();
    finish_ok(&registry, a, 0);
    registry.reap(a).unwrap();
    let b = registry.create_job(1, placement(1)).unwrap();
    assert_ne!(a, b);
}

#[test]
fn create_job_rejects_zero_or_mismatched_counts() {
    let registry = JobRegistry::new();
    assert!(matches!(
        registry.create_job(0, Vec::new()),
        Err(LaunchError::InvalidArgument(_))
    ));
    assert!(matches!(
        registry.create_job(3, placement(2)),
        Err(LaunchError::InvalidArgument(_))
    ));
    assert!(registry.is_empty());
}

#[test]
fn unknown_job_and_rank_are_reported() {
    let registry = JobRegistry::new();
    let job = registry.create_job(2, placement(2)).unwrap();

    let err = registry
        .record_transition(JobId::new(999), 0, ProcessState::Launched, None)
        .unwrap_err();
    assert!(matches!(err, LaunchError::UnknownJob(_)));

    let err = registry
        .record_transition(job, 5, ProcessState::Launched, None)
        .unwrap_err();
    assert!(matches!(err, LaunchError::UnknownRank { rank: 5, .. }));
}

#[test]
fn completion_tracks_terminal_ranks() {
    let registry = JobRegistry::new();
    let job = registry.create_job(2, placement(2)).unwrap();

    finish_ok(&registry, job, 0);
    assert!(!registry.is_complete(job).unwrap());

    registry
        .record_transition(job, 1, ProcessState::Lost, None)
        .unwrap();
    assert!(registry.is_complete(job).unwrap());
}

#[test]
fn reap_before_completion_fails_and_keeps_job() {
    let registry = JobRegistry::new();
    let job = registry.create_job(2, placement(2)).unwrap();
    finish_ok(&registry, job, 0);

    let err = registry.reap(job).unwrap_err();
    assert!(matches!(err, LaunchError::JobNotComplete(j) if j == job));
    assert!(registry.contains(job));
}

#[test]
fn reap_returns_codes_and_removes_job() {
    let registry = JobRegistry::new();
    let job = registry.create_job(3, placement(3)).unwrap();

    finish_ok(&registry, job, 0);
    registry
        .record_transition(job, 1, ProcessState::Launched, None)
        .unwrap();
    registry
        .record_transition(job, 1, ProcessState::ExitedFail, Some(2))
        .unwrap();
    registry
        .record_transition(job, 2, ProcessState::Lost, None)
        .unwrap();

    let summary = registry.reap(job).unwrap();
    assert_eq!(summary.exit_codes, vec![Some(0), Some(2), None]);
    assert_eq!(
        summary.final_states,
        vec![
            ProcessState::ExitedOk,
            ProcessState::ExitedFail,
            ProcessState::Lost
        ]
    );
    assert!(!summary.all_ok());

    assert!(!registry.contains(job));
    assert!(matches!(
        registry.snapshot(job),
        Err(LaunchError::UnknownJob(_))
    ));
}

#[test]
fn abort_marks_only_active_ranks_lost() {
    let registry = JobRegistry::new();
    let job = registry.create_job(5, placement(5)).unwrap();
    finish_ok(&registry, job, 0);
    finish_ok(&registry, job, 1);
    registry
        .record_transition(job, 2, ProcessState::Launched, None)
        .unwrap();

    let lost = registry.abort(job).unwrap();
    assert_eq!(lost, 3);

    assert_eq!(
        registry.rank_states(job).unwrap(),
        vec![
            ProcessState::ExitedOk,
            ProcessState::ExitedOk,
            ProcessState::Lost,
            ProcessState::Lost,
            ProcessState::Lost,
        ]
    );

    let summary = registry.reap(job).unwrap();
    assert_eq!(summary.exit_codes, vec![Some(0), Some(0), None, None, None]);
}

#[test]
fn expire_if_silent_only_touches_launched_ranks() {
    let registry = JobRegistry::new();
    let job = registry.create_job(3, placement(3)).unwrap();

    // rank 0: still pending
    assert!(!registry.expire_if_silent(job, 0).unwrap());

    // rank 1: launched and silent
    registry
        .record_transition(job, 1, ProcessState::Launched, None)
        .unwrap();
    assert!(registry.expire_if_silent(job, 1).unwrap());
    assert_eq!(registry.state_of(job, 1).unwrap(), ProcessState::Lost);

    // rank 2: started in time
    registry
        .record_transition(job, 2, ProcessState::Launched, None)
        .unwrap();
    registry
        .record_transition(job, 2, ProcessState::Running, None)
        .unwrap();
    assert!(!registry.expire_if_silent(job, 2).unwrap());
    assert_eq!(registry.state_of(job, 2).unwrap(), ProcessState::Running);
}

#[tokio::test]
async fn subscribers_see_every_transition() {
    let registry = JobRegistry::new();
    let job = registry.create_job(1, placement(1)).unwrap();
    let mut changes = registry.subscribe(job).unwrap();

    registry
        .record_transition(job, 0, ProcessState::Launched, None)
        .unwrap();
    changes.changed().await.unwrap();
    assert_eq!(*changes.borrow_and_update(), 1);

    // Rejected transitions do not bump the counter.
    let _ = registry.record_transition(job, 0, ProcessState::Pending, None);
    assert!(!changes.has_changed().unwrap());
}

#[test]
fn counts_always_sum_to_process_count_under_concurrency() {
    const RANKS: usize = 64;

    let registry = Arc::new(JobRegistry::new());
    let job = registry.create_job(RANKS, placement(RANKS)).unwrap();

    let workers: Vec<_> = (0..8)
        .map(|w| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for rank in (w..RANKS).step_by(8) {
                    registry
                        .record_transition(job, rank, ProcessState::Launched, None)
                        .unwrap();
                    let snap = registry.snapshot(job).unwrap();
                    assert_eq!(snap.counts.total(), RANKS);

                    let end = if rank % 3 == 0 {
                        ProcessState::ExitedFail
                    } else {
                        ProcessState::ExitedOk
                    };
                    registry
                        .record_transition(job, rank, end, Some((rank % 3 == 0) as i32))
                        .unwrap();
                }
            })
        })
        .collect();

    // Concurrent reader.
    for _ in 0..100 {
        let snap = registry.snapshot(job).unwrap();
        assert_eq!(snap.counts.total(), RANKS);
    }

    for w in workers {
        w.join().unwrap();
    }

    let snap = registry.snapshot(job).unwrap();
    assert!(snap.is_complete());
    assert_eq!(
        snap.counts.get(ProcessState::ExitedFail),
        (0..RANKS).filter(|r| r % 3 == 0).count()
    );
}

mod counts_property {
    use proptest::prelude::*;

    use proclaunch::job::JobRegistry;
    use proclaunch::types::ProcessState;

    fn any_state() -> impl Strategy<Value = ProcessState> {
        (0..ProcessState::ALL.len()).prop_map(|i| ProcessState::ALL[i])
    }

    proptest! {
        // Per-state counters always agree with the handles, accepted or not.
        #[test]
        fn counts_match_handles(
            n in 1usize..8,
            ops in proptest::collection::vec((0usize..8, any_state()), 0..40),
        ) {
            let registry = JobRegistry::new();
            let job = registry
                .create_job(n, (0..n).map(|i| format!("n{i}")).collect())
                .unwrap();

            for (rank, next) in ops {
                let _ = registry.record_transition(job, rank % n, next, None);

                let snap = registry.snapshot(job).unwrap();
                let handles = registry.handles(job).unwrap();
                prop_assert_eq!(snap.counts.total(), n);
                for state in ProcessState::ALL {
                    let expected = handles.iter().filter(|h| h.state() == state).count();
                    prop_assert_eq!(snap.counts.get(state), expected);
                }
                prop_assert_eq!(
                    snap.active_ranks.len(),
                    handles.iter().filter(|h| !h.is_terminal()).count()
                );
            }
        }
    }
}
