//! Conversions from registry state into rebalancer inputs.

use taskgrid_state::{NodeId, Registry, Task};

use crate::balance::TaskLoad;

impl From<&Task> for TaskLoad {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            consumption: u64::from(task.consumption),
        }
    }
}

/// Every task in the registry, pending or bound, as a rebalancer input.
pub fn task_loads(registry: &Registry) -> Vec<TaskLoad> {
    registry.tasks().map(TaskLoad::from).collect()
}

/// Detached copy of the task loads and node ids the rebalancer works on.
pub fn registry_snapshot(registry: &Registry) -> (Vec<TaskLoad>, Vec<NodeId>) {
    (task_loads(registry), registry.node_ids())
}
