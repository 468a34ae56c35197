#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use proclaunch::config::{ConfigFile, ConfigSection, JobSection, NodeConfig, RawConfigFile};
use proclaunch::engine::LaunchRequest;
use proclaunch::errors::Result;
use proclaunch::types::{ExecutableDescriptor, FanoutScope};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    /// `process_count` ranks of `true`, one per node `node-0`, `node-1`, ...
    pub fn new(process_count: usize) -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                node: BTreeMap::new(),
                job: JobSection {
                    process_count,
                    per_rank_timeout: "5s".to_string(),
                    placement: (0..process_count).map(|i| format!("node-{i}")).collect(),
                    per_node: None,
                    executable: ExecutableDescriptor::new("true"),
                },
            },
        }
    }

    pub fn with_node(mut self, name: &str, slots: Option<usize>) -> Self {
        self.config.node.insert(name.to_string(), NodeConfig { slots });
        self
    }

    pub fn with_placement(mut self, nodes: &[&str]) -> Self {
        self.config.job.placement = nodes.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_per_node(mut self, per_node: usize) -> Self {
        self.config.job.per_node = Some(per_node);
        self
    }

    pub fn with_timeout(mut self, timeout: &str) -> Self {
        self.config.job.per_rank_timeout = timeout.to_string();
        self
    }

    pub fn with_fanout(mut self, limit: usize, scope: FanoutScope) -> Self {
        self.config.config.fanout_limit = limit;
        self.config.config.fanout_scope = scope;
        self
    }

    pub fn with_executable(mut self, exe: ExecutableDescriptor) -> Self {
        self.config.job.executable = exe;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for `LaunchRequest`.
pub struct LaunchRequestBuilder {
    request: LaunchRequest,
}

impl LaunchRequestBuilder {
    /// `process_count` ranks on `node-0`, `node-1`, ... with a 5s timeout.
    pub fn new(process_count: usize) -> Self {
        let placement = (0..process_count).map(|i| format!("node-{i}")).collect();
        Self {
            request: LaunchRequest::new(
                placement,
                ExecutableDescriptor::new("payload"),
                Duration::from_secs(5),
            ),
        }
    }

    pub fn on_nodes(mut self, nodes: &[&str]) -> Self {
        self.request.placement = nodes.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.per_rank_timeout = timeout;
        self
    }

    pub fn process_count(mut self, count: usize) -> Self {
        self.request.process_count = count;
        self
    }

    pub fn executable(mut self, exe: ExecutableDescriptor) -> Self {
        self.request.executable = exe;
        self
    }

    pub fn build(self) -> LaunchRequest {
        self.request
    }
}
