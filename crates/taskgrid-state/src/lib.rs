//! taskgrid-state — the node/task registry for TaskGrid.
//!
//! Owns every `Node` and `Task` in the cluster, keyed by id. Task → node
//! bindings are stored as id values and resolved through the registry, so
//! removing a node never leaves a dangling reference behind.
//!
//! # Invariants
//!
//! Every public `Registry` operation preserves:
//!
//! - task ids and node ids are unique
//! - a bound task points at a registered node
//! - a node's `consumption` and `task_ids` mirror exactly the tasks bound to it
//! - a pending task is bound to no node
//!
//! Rebalancing results are applied through `Registry::apply_assignment`,
//! which validates the whole plan before touching any record.

pub mod error;
pub mod registry;
pub mod types;

pub use error::{StateError, StateResult};
pub use registry::Registry;
pub use types::*;
