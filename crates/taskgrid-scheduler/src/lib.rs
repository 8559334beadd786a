//! taskgrid-scheduler — the public face of TaskGrid.
//!
//! Wraps the registry (`taskgrid-state`) and the rebalancer
//! (`taskgrid-placement`) behind one `Scheduler` value. The scheduler:
//!
//! - Registers and unregisters nodes, adds and deletes tasks
//! - Rebalances every task across every node on demand, committing the
//!   optimal plan only when its load spread is within the threshold
//! - Reports task status in ascending task-id order
//! - Maps every outcome onto the numeric return-code table
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── Registry (nodes + tasks, keyed by id)
//!   ├── compute_rebalance (pure: snapshot in, plan out)
//!   └── Command / ReturnCode (scriptable entry point)
//! ```
//!
//! All operations are synchronous and take `&mut self`; callers that share
//! a scheduler must serialize access themselves.

pub mod command;
pub mod config;
pub mod error;
pub mod return_code;
pub mod scheduler;

pub use command::Command;
pub use config::SchedulerConfig;
pub use error::{SchedulerError, SchedulerResult};
pub use return_code::ReturnCode;
pub use scheduler::{ScheduleOutcome, Scheduler};
