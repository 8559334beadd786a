//! TaskGrid rebalancer — exact redistribution of tasks across nodes.
//!
//! This crate only computes plans. It never mutates the registry; the
//! scheduler (`taskgrid-scheduler`) decides whether a plan is committed.
//!
//! # Components
//!
//! - **`balance`** — Greedy bound plus binary search for the best
//!   achievable load spread and, among those, task-count spread
//! - **`plan`** — Lexicographic search that turns the optimum into the
//!   unique plan picked by the node-id tie-break rules
//! - **`pack`** — Bin-completion oracle both searches query: can the
//!   remaining tasks be split into bins that all fit a window
//! - **`convert`** — Snapshot of registry state into search inputs

pub mod balance;
pub mod convert;
mod pack;
pub mod plan;

pub use balance::{Balance, Spread, TaskLoad, optimal_balance};
pub use convert::{registry_snapshot, task_loads};
pub use plan::{RebalancePlan, compute_rebalance};
