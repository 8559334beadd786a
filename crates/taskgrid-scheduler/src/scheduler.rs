//! Scheduler — registry bookkeeping plus threshold-gated rebalancing.
//!
//! `schedule_task` never mutates while it searches: it snapshots the
//! registry, computes the optimal plan, checks the threshold, and only then
//! hands the whole plan to the registry to apply in one step.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use taskgrid_placement::{RebalancePlan, compute_rebalance, registry_snapshot};
use taskgrid_state::*;

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};

/// Result of a valid `schedule_task` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    /// The optimal plan was committed (or there was nothing to do).
    Succeeded {
        /// Tasks whose node binding changed.
        migrated: usize,
    },
    /// Even the optimal plan exceeds the threshold; nothing changed.
    NoSuitablePlan {
        /// Load spread of the optimal plan.
        load_spread: u64,
    },
}

/// Single-owner cluster scheduler.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    registry: Registry,
    /// Threshold used by [`Scheduler::rebalance`].
    default_threshold: Option<i64>,
}

impl Scheduler {
    /// Create an empty scheduler with no default threshold.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scheduler from configuration, registering its nodes.
    pub fn from_config(config: &SchedulerConfig) -> SchedulerResult<Self> {
        let default_threshold = config.threshold();
        if let Some(threshold) = default_threshold {
            if threshold <= 0 {
                return Err(SchedulerError::InvalidThreshold(threshold));
            }
        }

        let mut scheduler = Self {
            registry: Registry::new(),
            default_threshold,
        };
        for &node_id in config.node_ids() {
            scheduler.register_node(node_id)?;
        }
        info!(
            nodes = scheduler.registry.node_count(),
            threshold = ?default_threshold,
            "scheduler configured"
        );
        Ok(scheduler)
    }

    /// Read-only view of the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn default_threshold(&self) -> Option<i64> {
        self.default_threshold
    }

    /// Drop every node and task. The default threshold is kept.
    pub fn init(&mut self) {
        self.registry.clear();
        info!("scheduler initialized");
    }

    pub fn register_node(&mut self, node_id: NodeId) -> SchedulerResult<()> {
        Ok(self.registry.register_node(node_id)?)
    }

    /// Remove a node; its tasks become pending. Returns their ids.
    pub fn unregister_node(&mut self, node_id: NodeId) -> SchedulerResult<Vec<TaskId>> {
        Ok(self.registry.unregister_node(node_id)?)
    }

    pub fn add_task(&mut self, task_id: TaskId, consumption: u32) -> SchedulerResult<()> {
        Ok(self.registry.add_task(task_id, consumption)?)
    }

    /// Delete a task and return its last state.
    pub fn delete_task(&mut self, task_id: TaskId) -> SchedulerResult<Task> {
        Ok(self.registry.delete_task(task_id)?)
    }

    /// Optimal plan for the current tasks and nodes, without committing it.
    ///
    /// Returns `None` when no node is registered.
    pub fn plan(&self) -> Option<RebalancePlan> {
        let (tasks, nodes) = registry_snapshot(&self.registry);
        compute_rebalance(&tasks, &nodes)
    }

    /// Redistribute every task across every node.
    ///
    /// The optimal plan is committed only if its load spread is at most
    /// `threshold`; otherwise the registry is left untouched and
    /// [`ScheduleOutcome::NoSuitablePlan`] is returned.
    pub fn schedule_task(&mut self, threshold: i64) -> SchedulerResult<ScheduleOutcome> {
        if threshold <= 0 {
            return Err(SchedulerError::InvalidThreshold(threshold));
        }
        let plan = match self.plan() {
            Some(plan) if self.registry.task_count() > 0 => plan,
            _ => {
                debug!(
                    tasks = self.registry.task_count(),
                    nodes = self.registry.node_count(),
                    "nothing to schedule"
                );
                return Ok(ScheduleOutcome::Succeeded { migrated: 0 });
            }
        };

        if !plan.fits(threshold.unsigned_abs()) {
            info!(
                threshold,
                load_spread = plan.spread.load,
                "no plan within threshold, leaving assignments unchanged"
            );
            return Ok(ScheduleOutcome::NoSuitablePlan {
                load_spread: plan.spread.load,
            });
        }

        let migrated = self.registry.apply_assignment(&plan.assignments)?;
        debug_assert!(self.registry.check_invariants().is_ok());

        info!(
            threshold,
            load_spread = plan.spread.load,
            count_spread = plan.spread.count,
            migrated,
            "rebalance committed"
        );
        Ok(ScheduleOutcome::Succeeded { migrated })
    }

    /// [`Scheduler::schedule_task`] with the configured default threshold.
    pub fn rebalance(&mut self) -> SchedulerResult<ScheduleOutcome> {
        let threshold = self
            .default_threshold
            .ok_or(SchedulerError::ThresholdNotConfigured)?;
        self.schedule_task(threshold)
    }

    /// Status of every task, ascending by task id. Pending tasks report
    /// node id `-1`.
    pub fn query_task_status(&self) -> Vec<TaskStatus> {
        self.registry.task_statuses()
    }

    /// Clear `out` and fill it with the current task statuses.
    pub fn query_task_status_into(&self, out: &mut Vec<TaskStatus>) {
        out.clear();
        out.extend(self.registry.tasks().map(Task::status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(nodes: &[NodeId], tasks: &[(TaskId, u32)]) -> Scheduler {
        let mut s = Scheduler::new();
        for &id in nodes {
            s.register_node(id).unwrap();
        }
        for &(id, consumption) in tasks {
            s.add_task(id, consumption).unwrap();
        }
        s
    }

    fn placements(s: &Scheduler) -> Vec<(TaskId, NodeId)> {
        s.query_task_status()
            .iter()
            .map(|t| (t.task_id, t.node_id))
            .collect()
    }

    #[test]
    fn non_positive_threshold_is_rejected_without_mutation() {
        let mut s = scheduler(&[1, 2], &[(1, 10), (2, 10)]);
        for threshold in [0, -1, i64::MIN] {
            assert_eq!(
                s.schedule_task(threshold),
                Err(SchedulerError::InvalidThreshold(threshold))
            );
        }
        assert!(s.query_task_status().iter().all(TaskStatus::is_pending));
    }

    #[test]
    fn empty_cluster_schedules_trivially() {
        let mut s = scheduler(&[], &[(1, 10)]);
        assert_eq!(s.schedule_task(5), Ok(ScheduleOutcome::Succeeded { migrated: 0 }));
        assert_eq!(placements(&s), vec![(1, PENDING_NODE_ID)]);

        let mut s = scheduler(&[1], &[]);
        assert_eq!(s.schedule_task(5), Ok(ScheduleOutcome::Succeeded { migrated: 0 }));
    }

    #[test]
    fn commits_optimal_plan_within_threshold() {
        let mut s = scheduler(&[1, 2], &[(1, 10), (2, 10), (3, 10), (4, 10)]);

        assert_eq!(s.schedule_task(5), Ok(ScheduleOutcome::Succeeded { migrated: 4 }));
        assert_eq!(placements(&s), vec![(1, 1), (2, 1), (3, 2), (4, 2)]);
        assert_eq!(s.registry().node(1).unwrap().consumption, 20);
        assert_eq!(s.registry().node(2).unwrap().consumption, 20);
    }

    #[test]
    fn refuses_plan_over_threshold() {
        let mut s = scheduler(&[1, 2], &[(1, 100)]);
        let before = s.registry().clone();

        assert_eq!(
            s.schedule_task(1),
            Ok(ScheduleOutcome::NoSuitablePlan { load_spread: 100 })
        );
        assert_eq!(s.registry(), &before);
        assert!(s.registry().task(1).unwrap().is_pending());
    }

    #[test]
    fn rebalance_requires_default_threshold() {
        let mut s = scheduler(&[1], &[(1, 1)]);
        assert_eq!(s.rebalance(), Err(SchedulerError::ThresholdNotConfigured));
    }

    #[test]
    fn query_into_clears_buffer_first() {
        let s = scheduler(&[1], &[(2, 5), (1, 5)]);
        let mut out = vec![Task::pending(99, 0).status()];

        s.query_task_status_into(&mut out);

        assert_eq!(out, s.query_task_status());
        assert_eq!(out.iter().map(|t| t.task_id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn init_clears_state_but_keeps_threshold() {
        let config =
            SchedulerConfig::parse("[schedule]\nthreshold = 3\n[cluster]\nnodes = [1]\n").unwrap();
        let mut s = Scheduler::from_config(&config).unwrap();
        s.add_task(1, 1).unwrap();

        s.init();

        assert_eq!(s.registry().node_count(), 0);
        assert_eq!(s.registry().task_count(), 0);
        assert_eq!(s.default_threshold(), Some(3));
    }
}
