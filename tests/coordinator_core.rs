// tests/coordinator_core.rs

use proclaunch::engine::{CoordinatorInput, CoordinatorState};
use proclaunch::job::JobRegistry;
use proclaunch::job::StateCounts;
use proclaunch::types::ProcessState;

fn counts_for(outcomes: &[ProcessState]) -> StateCounts {
    let registry = JobRegistry::new();
    let job = registry
        .create_job(
            outcomes.len(),
            (0..outcomes.len()).map(|i| format!("n{i}")).collect(),
        )
        .unwrap();

    for (rank, outcome) in outcomes.iter().enumerate() {
        match outcome {
            ProcessState::Pending => {}
            ProcessState::Lost => registry
                .record_transition(job, rank, ProcessState::Lost, None)
                .unwrap(),
            other => {
                registry
                    .record_transition(job, rank, ProcessState::Launched, None)
                    .unwrap();
                if *other != ProcessState::Launched {
                    let code = (*other == ProcessState::ExitedFail) as i32;
                    registry
                        .record_transition(job, rank, *other, Some(code))
                        .unwrap();
                }
            }
        }
    }
    registry.snapshot(job).unwrap().counts
}

#[test]
fn happy_path_walks_every_phase() {
    let s = CoordinatorState::CollectingRequest;
    let s = s.on(CoordinatorInput::RequestAccepted);
    assert_eq!(s, CoordinatorState::Dispatching);
    let s = s.on(CoordinatorInput::DispatchFinished);
    assert_eq!(s, CoordinatorState::Monitoring);

    let running = counts_for(&[ProcessState::ExitedOk, ProcessState::Running]);
    let s = s.on(CoordinatorInput::Progress(running));
    assert_eq!(s, CoordinatorState::Monitoring);

    let done = counts_for(&[ProcessState::ExitedOk, ProcessState::ExitedOk]);
    let s = s.on(CoordinatorInput::Progress(done));
    assert_eq!(s, CoordinatorState::Complete);
}

#[test]
fn pending_ranks_keep_the_job_monitoring() {
    let counts = counts_for(&[ProcessState::ExitedOk, ProcessState::Pending]);
    assert_eq!(
        CoordinatorState::Monitoring.on(CoordinatorInput::Progress(counts)),
        CoordinatorState::Monitoring
    );
    assert_eq!(counts.to_string(), "pending=1, exited_ok=1");
}

#[test]
fn any_failure_or_loss_gives_partial_failure() {
    for outcomes in [
        vec![ProcessState::ExitedOk, ProcessState::ExitedFail],
        vec![ProcessState::Lost, ProcessState::ExitedOk],
        vec![ProcessState::Lost, ProcessState::Lost],
    ] {
        let counts = counts_for(&outcomes);
        assert_eq!(
            CoordinatorState::Monitoring.on(CoordinatorInput::Progress(counts)),
            CoordinatorState::PartialFailure,
            "outcomes {outcomes:?}"
        );
    }
}

#[test]
fn progress_is_ignored_while_dispatching() {
    let done = counts_for(&[ProcessState::ExitedOk]);
    assert_eq!(
        CoordinatorState::Dispatching.on(CoordinatorInput::Progress(done)),
        CoordinatorState::Dispatching
    );
}

#[test]
fn abort_wins_from_any_non_terminal_state() {
    for s in [
        CoordinatorState::CollectingRequest,
        CoordinatorState::Dispatching,
        CoordinatorState::Monitoring,
    ] {
        assert_eq!(
            s.on(CoordinatorInput::AbortRequested),
            CoordinatorState::Aborted
        );
    }
}

#[test]
fn terminal_states_absorb_every_input() {
    let inputs = [
        CoordinatorInput::RequestAccepted,
        CoordinatorInput::DispatchFinished,
        CoordinatorInput::AbortRequested,
        CoordinatorInput::Progress(counts_for(&[ProcessState::ExitedFail])),
    ];

    for terminal in [
        CoordinatorState::Complete,
        CoordinatorState::PartialFailure,
        CoordinatorState::Aborted,
    ] {
        assert!(terminal.is_terminal());
        for input in inputs {
            assert_eq!(terminal.on(input), terminal);
        }
    }
}
