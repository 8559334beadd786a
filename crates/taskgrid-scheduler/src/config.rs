//! taskgrid.toml configuration parser.
//!
//! ```toml
//! [schedule]
//! threshold = 10
//!
//! [cluster]
//! nodes = [1, 2, 3]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use taskgrid_state::NodeId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub schedule: Option<ScheduleConfig>,
    pub cluster: Option<ClusterConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Default threshold for `Scheduler::rebalance`.
    pub threshold: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Nodes registered when the scheduler is built.
    #[serde(default)]
    pub nodes: Vec<NodeId>,
}

impl SchedulerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn threshold(&self) -> Option<i64> {
        self.schedule.as_ref().map(|s| s.threshold)
    }

    pub fn node_ids(&self) -> &[NodeId] {
        self.cluster
            .as_ref()
            .map(|c| c.nodes.as_slice())
            .unwrap_or_default()
    }
}
