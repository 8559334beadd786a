//! Registry — id-keyed ownership of nodes and tasks.
//!
//! All validation happens before any record is touched, so every
//! operation either fully succeeds or leaves the registry unchanged.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::types::*;

/// In-memory registry of nodes and tasks.
///
/// `BTreeMap` keeps both collections ordered by id, which gives status
/// queries and snapshots their ascending order for free.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    nodes: BTreeMap<NodeId, Node>,
    tasks: BTreeMap<TaskId, Task>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every node and task.
    pub fn clear(&mut self) {
        let (nodes, tasks) = (self.nodes.len(), self.tasks.len());
        self.nodes.clear();
        self.tasks.clear();
        debug!(nodes, tasks, "registry cleared");
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Register a new, empty node.
    pub fn register_node(&mut self, node_id: NodeId) -> StateResult<()> {
        if node_id <= 0 {
            return Err(StateError::InvalidNodeId(node_id));
        }
        if self.nodes.contains_key(&node_id) {
            return Err(StateError::NodeAlreadyRegistered(node_id));
        }
        self.nodes.insert(node_id, Node::new(node_id));
        debug!(node_id, "node registered");
        Ok(())
    }

    /// Remove a node. Its tasks stay in the registry as pending.
    ///
    /// Returns the ids of the tasks that were moved back to pending.
    pub fn unregister_node(&mut self, node_id: NodeId) -> StateResult<Vec<TaskId>> {
        if node_id <= 0 {
            return Err(StateError::InvalidNodeId(node_id));
        }
        let node = self
            .nodes
            .remove(&node_id)
            .ok_or(StateError::NodeNotFound(node_id))?;

        let orphaned: Vec<TaskId> = node.task_ids.into_iter().collect();
        for task_id in &orphaned {
            if let Some(task) = self.tasks.get_mut(task_id) {
                task.node_id = None;
            }
        }
        debug!(node_id, orphaned = orphaned.len(), "node unregistered");
        Ok(orphaned)
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// All nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ── Tasks ──────────────────────────────────────────────────────

    /// Add a new task to the pending set.
    pub fn add_task(&mut self, task_id: TaskId, consumption: u32) -> StateResult<()> {
        if task_id <= 0 {
            return Err(StateError::InvalidTaskId(task_id));
        }
        if self.tasks.contains_key(&task_id) {
            return Err(StateError::TaskAlreadyExists(task_id));
        }
        self.tasks.insert(task_id, Task::pending(task_id, consumption));
        debug!(task_id, consumption, "task added");
        Ok(())
    }

    /// Delete a task, pending or bound. Returns the removed record.
    pub fn delete_task(&mut self, task_id: TaskId) -> StateResult<Task> {
        if task_id <= 0 {
            return Err(StateError::InvalidTaskId(task_id));
        }
        let task = self
            .tasks
            .remove(&task_id)
            .ok_or(StateError::TaskNotFound(task_id))?;

        if let Some(node) = task.node_id.and_then(|id| self.nodes.get_mut(&id)) {
            node.unbind(&task);
        }
        debug!(task_id, node_id = ?task.node_id, "task deleted");
        Ok(task)
    }

    pub fn task(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks.get(&task_id)
    }

    /// All tasks in ascending id order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Tasks not currently bound to any node.
    pub fn pending_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values().filter(|t| t.is_pending())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Status snapshot of every task, ascending by task id.
    pub fn task_statuses(&self) -> Vec<TaskStatus> {
        self.tasks.values().map(Task::status).collect()
    }

    // ── Bindings ───────────────────────────────────────────────────

    /// Replace every binding with the given node → tasks assignment.
    ///
    /// The assignment must mention every task exactly once and only
    /// registered nodes; nodes absent from the map end up empty. Nothing is
    /// mutated unless the whole assignment is valid.
    ///
    /// Returns the number of tasks whose node changed.
    pub fn apply_assignment(
        &mut self,
        assignment: &BTreeMap<NodeId, Vec<TaskId>>,
    ) -> StateResult<usize> {
        let mut seen: HashSet<TaskId> = HashSet::with_capacity(self.tasks.len());
        for (node_id, task_ids) in assignment {
            if !self.nodes.contains_key(node_id) {
                return Err(StateError::InvalidAssignment(format!(
                    "node {node_id} is not registered"
                )));
            }
            for task_id in task_ids {
                if !self.tasks.contains_key(task_id) {
                    return Err(StateError::InvalidAssignment(format!(
                        "task {task_id} does not exist"
                    )));
                }
                if !seen.insert(*task_id) {
                    return Err(StateError::InvalidAssignment(format!(
                        "task {task_id} assigned more than once"
                    )));
                }
            }
        }
        if seen.len() != self.tasks.len() {
            return Err(StateError::InvalidAssignment(format!(
                "{} of {} tasks left unassigned",
                self.tasks.len() - seen.len(),
                self.tasks.len()
            )));
        }

        for node in self.nodes.values_mut() {
            node.consumption = 0;
            node.task_ids.clear();
        }

        let mut migrated = 0;
        for (node_id, task_ids) in assignment {
            for task_id in task_ids {
                let (Some(task), Some(node)) =
                    (self.tasks.get_mut(task_id), self.nodes.get_mut(node_id))
                else {
                    continue;
                };
                if task.node_id != Some(*node_id) {
                    migrated += 1;
                    task.node_id = Some(*node_id);
                }
                node.bind(task);
            }
        }

        debug!(
            nodes = assignment.len(),
            tasks = seen.len(),
            migrated,
            "assignment applied"
        );
        Ok(migrated)
    }

    /// Verify the full invariant set, reporting the first violation found.
    pub fn check_invariants(&self) -> StateResult<()> {
        for (id, node) in &self.nodes {
            if *id != node.id {
                return Err(StateError::InvariantViolation(format!(
                    "node keyed {id} carries id {}",
                    node.id
                )));
            }
            let mut expected = 0u64;
            for task_id in &node.task_ids {
                let task = self.tasks.get(task_id).ok_or_else(|| {
                    StateError::InvariantViolation(format!(
                        "node {id} lists missing task {task_id}"
                    ))
                })?;
                if task.node_id != Some(*id) {
                    return Err(StateError::InvariantViolation(format!(
                        "node {id} lists task {task_id} bound to {:?}",
                        task.node_id
                    )));
                }
                expected += u64::from(task.consumption);
            }
            if expected != node.consumption {
                return Err(StateError::InvariantViolation(format!(
                    "node {id} consumption {} != bound total {expected}",
                    node.consumption
                )));
            }
        }

        for (id, task) in &self.tasks {
            if *id != task.id {
                return Err(StateError::InvariantViolation(format!(
                    "task keyed {id} carries id {}",
                    task.id
                )));
            }
            if let Some(node_id) = task.node_id {
                let bound = self
                    .nodes
                    .get(&node_id)
                    .is_some_and(|n| n.task_ids.contains(id));
                if !bound {
                    return Err(StateError::InvariantViolation(format!(
                        "task {id} points at node {node_id} which does not list it"
                    )));
                }
            }
        }
        Ok(())
    }
}
