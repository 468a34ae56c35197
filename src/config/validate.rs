// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{LaunchError, Result};
use crate::types::NodeId;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = LaunchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_global_config(&raw)?;
        validate_nodes(&raw)?;
        validate_job(&raw)?;

        let placement = expand_placement(&raw)?;
        let per_rank_timeout = parse_timeout(&raw.job.per_rank_timeout)?;

        Ok(ConfigFile::new_unchecked(
            raw.config,
            raw.node,
            raw.job,
            placement,
            per_rank_timeout,
        ))
    }
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.fanout_limit == 0 {
        return Err(LaunchError::ConfigError(
            "[config].fanout_limit must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.collector_lanes == 0 {
        return Err(LaunchError::ConfigError(
            "[config].collector_lanes must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.event_queue_length == 0 {
        return Err(LaunchError::ConfigError(
            "[config].event_queue_length must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_nodes(cfg: &RawConfigFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        if node.slots == Some(0) {
            return Err(LaunchError::ConfigError(format!(
                "node '{}' must have at least one slot",
                name
            )));
        }
    }
    Ok(())
}

fn validate_job(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.process_count == 0 {
        return Err(LaunchError::ConfigError(
            "[job].process_count must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.job.executable.program.trim().is_empty() {
        return Err(LaunchError::ConfigError(
            "[job.executable].program must not be empty".to_string(),
        ));
    }
    if cfg.job.placement.is_empty() {
        return Err(LaunchError::ConfigError(
            "[job].placement must name at least one node".to_string(),
        ));
    }
    // Nodes outside [node.*] pass; the transport rejects them at spawn time
    // and those ranks end lost.
    Ok(())
}

/// Node of every rank.
///
/// Without `per_node` the list must have one entry per rank. With
/// `per_node = k`, node `i` hosts ranks `i*k .. (i+1)*k`, and the expansion
/// must cover `process_count`.
fn expand_placement(cfg: &RawConfigFile) -> Result<Vec<NodeId>> {
    let count = cfg.job.process_count;
    let nodes = &cfg.job.placement;

    match cfg.job.per_node {
        None => {
            if nodes.len() != count {
                return Err(LaunchError::ConfigError(format!(
                    "[job].placement has {} entries but process_count is {} (set per_node to expand)",
                    nodes.len(),
                    count
                )));
            }
            Ok(nodes.clone())
        }
        Some(0) => Err(LaunchError::ConfigError(
            "[job].per_node must be >= 1 (got 0)".to_string(),
        )),
        Some(per_node) => {
            let capacity = nodes.len().checked_mul(per_node).ok_or_else(|| {
                LaunchError::ConfigError(format!(
                    "[job].per_node = {} is too large for {} nodes",
                    per_node,
                    nodes.len()
                ))
            })?;
            if capacity < count {
                return Err(LaunchError::ConfigError(format!(
                    "{} nodes x {} per node only place {} of {} processes",
                    nodes.len(),
                    per_node,
                    capacity,
                    count
                )));
            }
            Ok(nodes
                .iter()
                .flat_map(|node| std::iter::repeat_n(node.clone(), per_node))
                .take(count)
                .collect())
        }
    }
}

fn parse_timeout(s: &str) -> Result<Duration> {
    let timeout = parse_duration(s)
        .map_err(|e| LaunchError::ConfigError(format!("[job].per_rank_timeout: {e}")))?;
    if timeout.is_zero() {
        return Err(LaunchError::ConfigError(
            "[job].per_rank_timeout must be greater than zero".to_string(),
        ));
    }
    Ok(timeout)
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}
