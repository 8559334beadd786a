//! Domain types for the TaskGrid registry.
//!
//! Tasks reference their node by id only. The status snapshot keeps the
//! wire-level convention of `-1` for a pending task so external callers can
//! consume it without knowing about `Option`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the cluster. Valid ids are `> 0`.
pub type NodeId = i32;

/// Unique identifier for a task. Valid ids are `> 0`.
pub type TaskId = i32;

/// Node id reported for a task that is not bound to any node.
pub const PENDING_NODE_ID: NodeId = -1;

// ── Task ──────────────────────────────────────────────────────────

/// A weighted unit of work, optionally bound to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Resource consumption weight.
    pub consumption: u32,
    /// Owning node, `None` while the task is pending.
    pub node_id: Option<NodeId>,
}

impl Task {
    /// Create a new pending task.
    pub fn pending(id: TaskId, consumption: u32) -> Self {
        Self {
            id,
            consumption,
            node_id: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.node_id.is_none()
    }

    /// Snapshot of this task for status queries.
    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            task_id: self.id,
            node_id: self.node_id.unwrap_or(PENDING_NODE_ID),
            consumption: self.consumption,
        }
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// A registered compute node and the aggregate load of its bound tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Sum of `consumption` over the bound tasks.
    pub consumption: u64,
    /// Ids of the bound tasks.
    pub task_ids: BTreeSet<TaskId>,
}

impl Node {
    /// Create an empty node with zero consumption.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            consumption: 0,
            task_ids: BTreeSet::new(),
        }
    }

    pub fn task_count(&self) -> usize {
        self.task_ids.len()
    }

    pub(crate) fn bind(&mut self, task: &Task) {
        if self.task_ids.insert(task.id) {
            self.consumption += u64::from(task.consumption);
        }
    }

    pub(crate) fn unbind(&mut self, task: &Task) {
        if self.task_ids.remove(&task.id) {
            self.consumption = self.consumption.saturating_sub(u64::from(task.consumption));
        }
    }
}

// ── Status ────────────────────────────────────────────────────────

/// Point-in-time view of a task, as returned by status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    /// Owning node id, or [`PENDING_NODE_ID`] for a pending task.
    pub node_id: NodeId,
    pub consumption: u32,
}

impl TaskStatus {
    pub fn is_pending(&self) -> bool {
        self.node_id == PENDING_NODE_ID
    }
}
