// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod job;
pub mod logging;
pub mod transport;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{CoordinatorState, LaunchCoordinator};
use crate::events::{EventCollector, event_channel};
use crate::job::{JobRegistry, ReapSummary};
use crate::transport::LocalProcessTransport;
use crate::types::JobId;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - job registry and event collector
/// - local process transport
/// - launch coordinator
/// - Ctrl-C handling
///
/// Returns the job's final coordinator state, or `None` for a dry run.
pub async fn run(args: CliArgs) -> Result<Option<CoordinatorState>> {
    let config_path = args.config_path();
    let mut cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if let Some(fanout) = args.fanout {
        if fanout == 0 {
            anyhow::bail!("--fanout must be at least 1");
        }
        cfg.config.fanout_limit = fanout;
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(None);
    }

    let registry = Arc::new(JobRegistry::new());

    // Node events: transport -> ingress queue -> collector lanes -> registry.
    let (events_tx, events_rx) = event_channel(cfg.config.event_queue_length);
    let collector =
        EventCollector::new(Arc::clone(&registry), cfg.config.collector_lanes).spawn(events_rx);

    let transport = Arc::new(LocalProcessTransport::new(cfg.node_slots(), events_tx));
    let coordinator = Arc::new(LaunchCoordinator::new(
        Arc::clone(&registry),
        transport,
        cfg.coordinator_options(),
    ));

    let job = coordinator
        .launch(cfg.launch_request())
        .context("launch request rejected")?;

    // Ctrl-C → abort the job.
    {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!(%job, "interrupt received; aborting job");
            if let Err(e) = coordinator.abort(job) {
                warn!(%job, error = %e, "abort failed");
            }
        });
    }

    let state = coordinator.wait(job).await?;
    let summary = coordinator.reap(job)?;
    print_summary(job, state, &summary);

    let counts = collector.counts();
    info!(
        applied = counts.applied,
        duplicates = counts.duplicates,
        faults = counts.faults,
        dropped = counts.dropped,
        "event collector totals"
    );
    collector.shutdown();

    Ok(Some(state))
}

fn print_summary(job: JobId, state: CoordinatorState, summary: &ReapSummary) {
    println!("{job}: {state}");
    for (rank, (code, final_state)) in summary
        .exit_codes
        .iter()
        .zip(summary.final_states.iter())
        .enumerate()
    {
        match code {
            Some(code) => println!("  rank {rank}: {final_state} (exit {code})"),
            None => println!("  rank {rank}: {final_state}"),
        }
    }
}

/// Simple dry-run output: print coordinator settings and the placement plan.
fn print_dry_run(cfg: &ConfigFile) {
    println!("proclaunch dry-run");
    println!("  config.fanout_limit = {}", cfg.config.fanout_limit);
    println!("  config.fanout_scope = {}", cfg.config.fanout_scope);
    println!("  config.collector_lanes = {}", cfg.config.collector_lanes);
    println!(
        "  config.event_queue_length = {}",
        cfg.config.event_queue_length
    );
    println!();

    println!("job:");
    println!("  executable: {}", cfg.job.executable);
    if !cfg.job.executable.env.is_empty() {
        println!("  env: {:?}", cfg.job.executable.env);
    }
    println!("  per_rank_timeout: {:?}", cfg.per_rank_timeout());
    println!();

    println!("placement ({} ranks):", cfg.placement().len());
    for (rank, node) in cfg.placement().iter().enumerate() {
        println!("  - rank {rank} -> {node}");
    }

    if !cfg.node.is_empty() {
        println!();
        println!("nodes ({}):", cfg.node.len());
        for (name, node) in cfg.node.iter() {
            match node.slots {
                Some(slots) => println!("  - {name} (slots: {slots})"),
                None => println!("  - {name} (slots: unlimited)"),
            }
        }
    }

    debug!("dry-run complete (nothing spawned)");
}
