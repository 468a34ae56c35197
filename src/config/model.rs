// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{CoordinatorOptions, LaunchRequest};
use crate::transport::NodeSlots;
use crate::types::{ExecutableDescriptor, FanoutScope, NodeId};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// fanout_limit = 16
/// fanout_scope = "job"
///
/// [node.localhost]
/// slots = 8
///
/// [job]
/// process_count = 8
/// per_rank_timeout = "10s"
/// placement = ["localhost"]
/// per_node = 8
///
/// [job.executable]
/// program = "sleep"
/// args = ["1"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Coordinator behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Nodes the local transport may place ranks on, from `[node.<name>]`.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,

    /// The job to launch, from `[job]`.
    pub job: JobSection,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum spawn requests in flight.
    #[serde(default = "default_fanout_limit")]
    pub fanout_limit: usize,

    /// `"job"` (default) or `"global"`.
    #[serde(default)]
    pub fanout_scope: FanoutScope,

    /// Number of event collector lanes.
    #[serde(default = "default_collector_lanes")]
    pub collector_lanes: usize,

    /// Capacity of the node-event ingress queue.
    #[serde(default = "default_event_queue_length")]
    pub event_queue_length: usize,
}

fn default_fanout_limit() -> usize {
    16
}

fn default_collector_lanes() -> usize {
    4
}

fn default_event_queue_length() -> usize {
    256
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            fanout_limit: default_fanout_limit(),
            fanout_scope: FanoutScope::default(),
            collector_lanes: default_collector_lanes(),
            event_queue_length: default_event_queue_length(),
        }
    }
}

/// `[node.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    /// Concurrent ranks allowed on the node; unlimited when absent.
    #[serde(default)]
    pub slots: Option<usize>,
}

/// `[job]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSection {
    pub process_count: usize,

    /// Duration string such as `"500ms"`, `"10s"` or `"2m"`.
    #[serde(default = "default_per_rank_timeout")]
    pub per_rank_timeout: String,

    /// Node per rank, or the node list to expand with `per_node`.
    #[serde(default)]
    pub placement: Vec<String>,

    /// When set, each entry of `placement` hosts this many consecutive
    /// ranks (the `ppr:N:node` mapping).
    #[serde(default)]
    pub per_node: Option<usize>,

    pub executable: ExecutableDescriptor,
}

fn default_per_rank_timeout() -> String {
    "30s".to_string()
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>`, so the expanded
/// placement always has exactly `process_count` entries and the timeout is
/// non-zero.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub node: BTreeMap<String, NodeConfig>,
    pub job: JobSection,
    placement: Vec<NodeId>,
    per_rank_timeout: Duration,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        node: BTreeMap<String, NodeConfig>,
        job: JobSection,
        placement: Vec<NodeId>,
        per_rank_timeout: Duration,
    ) -> Self {
        Self {
            config,
            node,
            job,
            placement,
            per_rank_timeout,
        }
    }

    /// Node of every rank, in rank order.
    pub fn placement(&self) -> &[NodeId] {
        &self.placement
    }

    pub fn per_rank_timeout(&self) -> Duration {
        self.per_rank_timeout
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            fanout_limit: self.config.fanout_limit,
            fanout_scope: self.config.fanout_scope,
        }
    }

    pub fn launch_request(&self) -> LaunchRequest {
        LaunchRequest::new(
            self.placement.clone(),
            self.job.executable.clone(),
            self.per_rank_timeout,
        )
    }

    /// Slot pools for the local transport.
    ///
    /// With no `[node.*]` sections, every node named in the placement is
    /// accepted with unlimited slots.
    pub fn node_slots(&self) -> BTreeMap<NodeId, NodeSlots> {
        if self.node.is_empty() {
            return self
                .placement
                .iter()
                .map(|n| (n.clone(), NodeSlots::default()))
                .collect();
        }

        self.node
            .iter()
            .map(|(name, cfg)| (name.clone(), NodeSlots { limit: cfg.slots }))
            .collect()
    }
}
