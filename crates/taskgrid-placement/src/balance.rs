//! Balance search — the best achievable spread for a task set.
//!
//! Finds the minimum `(load spread, count spread)` pair over every way of
//! splitting the tasks into `node_count` unlabeled bins:
//! - **Load spread**: heaviest bin total minus lightest bin total (primary)
//! - **Count spread**: fullest bin task count minus emptiest (secondary)
//!
//! Largest-first greedy gives an upper bound. When it already meets the
//! arithmetic lower bound it is the answer. Otherwise the load spread is
//! binary searched, then the count spread at that load spread. Each step
//! asks the [`Packer`] for a split whose bins all fit a window
//! `[m, m + spread]`, for some lightest load `m`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use taskgrid_state::TaskId;

use crate::pack::{Packer, TaskSet, Window};

/// A task as seen by the rebalancer: id plus consumption weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLoad {
    pub id: TaskId,
    pub consumption: u64,
}

/// Imbalance of an assignment. Ordering compares `load` first, then `count`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Spread {
    /// Maximum pairwise difference in per-node total consumption.
    pub load: u64,
    /// Maximum pairwise difference in per-node task count.
    pub count: usize,
}

/// Optimal spread together with one assignment that achieves it.
#[derive(Debug, Clone)]
pub struct Balance {
    pub spread: Spread,
    /// Witness bins, each a list of indices into the input task slice.
    pub bins: Vec<Vec<usize>>,
}

/// Compute the optimal spread of `tasks` over `node_count` bins.
///
/// Returns `None` when there are no bins to fill.
pub fn optimal_balance(tasks: &[TaskLoad], node_count: usize) -> Option<Balance> {
    if node_count == 0 {
        return None;
    }

    let mut search = BalanceSearch::new(tasks, node_count);
    let (spread, bins) = search.run();

    debug!(
        tasks = tasks.len(),
        nodes = node_count,
        explored = search.packer.explored(),
        "balance search finished"
    );

    let bins: Vec<Vec<usize>> = bins
        .into_iter()
        .map(|bin| bin.into_iter().map(|p| search.packer.task_at(p)).collect())
        .collect();
    Some(Balance { spread, bins })
}

/// Bins here hold packer positions, not task indices.
struct BalanceSearch {
    packer: Packer,
    node_count: usize,
    total: u64,
}

impl BalanceSearch {
    fn new(tasks: &[TaskLoad], node_count: usize) -> Self {
        Self {
            packer: Packer::new(tasks),
            node_count,
            total: tasks.iter().map(|t| t.consumption).sum(),
        }
    }

    fn run(&mut self) -> (Spread, Vec<Vec<usize>>) {
        let task_count = self.packer.len();
        if task_count == 0 {
            return (Spread::default(), vec![Vec::new(); self.node_count]);
        }

        let greedy = self.greedy();
        let greedy_spread = self.spread_of(&greedy);
        let floor = self.floor();
        if greedy_spread == floor {
            return (greedy_spread, greedy);
        }

        let (load, witness) = smallest(floor.load, greedy_spread.load, |load| {
            self.feasible(load, task_count)
        });
        let bins = witness.unwrap_or(greedy);

        let count_hi = self.spread_of(&bins).count as u64;
        let (count, witness) = smallest(floor.count as u64, count_hi, |count| {
            self.feasible(load, count as usize)
        });
        let spread = Spread {
            load,
            count: count as usize,
        };
        (spread, witness.unwrap_or(bins))
    }

    /// Largest first, each task to the lightest bin, then the emptiest,
    /// then the lowest index.
    fn greedy(&self) -> Vec<Vec<usize>> {
        let mut bins: Vec<Vec<usize>> = vec![Vec::new(); self.node_count];
        let mut loads = vec![0u64; self.node_count];
        for position in 0..self.packer.len() {
            let target = (0..self.node_count)
                .min_by_key(|&b| (loads[b], bins[b].len(), b))
                .unwrap_or(0);
            bins[target].push(position);
            loads[target] += self.packer.weight(position);
        }
        bins
    }

    /// No split can do better than this.
    fn floor(&self) -> Spread {
        let nodes = self.node_count as u64;
        let task_count = self.packer.len();
        let heaviest = self.packer.weight(0).max(self.total.div_ceil(nodes));
        let lightest = if task_count >= self.node_count {
            self.total / nodes
        } else {
            0
        };
        Spread {
            load: heaviest - lightest,
            count: usize::from(task_count % self.node_count != 0),
        }
    }

    fn spread_of(&self, bins: &[Vec<usize>]) -> Spread {
        let loads =
            bins.iter().map(|bin| bin.iter().map(|&p| self.packer.weight(p)).sum::<u64>());
        let counts = bins.iter().map(Vec::len);
        Spread {
            load: loads.clone().max().unwrap_or(0) - loads.min().unwrap_or(0),
            count: counts.clone().max().unwrap_or(0) - counts.min().unwrap_or(0),
        }
    }

    /// A split within both spreads, if one exists.
    ///
    /// The lightest bin's load `m` and task count `c` are unknown, so the
    /// first window covers all of them at once. A split it admits that is
    /// still too wide sends the search into the two halves of the range.
    fn feasible(&mut self, load_spread: u64, count_spread: usize) -> Option<Vec<Vec<usize>>> {
        let nodes = self.node_count as u64;
        let task_count = self.packer.len();
        let lightest = (
            self.total
                .div_ceil(nodes)
                .saturating_sub(load_spread)
                .max(self.packer.weight(0).saturating_sub(load_spread)),
            self.total / nodes,
        );
        let emptiest = (
            task_count.div_ceil(self.node_count).saturating_sub(count_spread),
            task_count / self.node_count,
        );
        let all = TaskSet::full(task_count);

        let mut ranges = vec![(lightest, emptiest)];
        while let Some(((m_lo, m_hi), (c_lo, c_hi))) = ranges.pop() {
            if m_lo > m_hi || c_lo > c_hi {
                continue;
            }
            let window = Window::new((m_lo, m_hi + load_spread), (c_lo, c_hi + count_spread));
            let Some(bins) = self.packer.pack(&all, self.node_count, window) else {
                continue;
            };
            let spread = self.spread_of(&bins);
            if spread.load <= load_spread && spread.count <= count_spread {
                return Some(bins);
            }
            if spread.load > load_spread && m_lo < m_hi {
                let mid = m_lo + (m_hi - m_lo) / 2;
                ranges.push(((mid + 1, m_hi), (c_lo, c_hi)));
                ranges.push(((m_lo, mid), (c_lo, c_hi)));
            } else if c_lo < c_hi {
                let mid = c_lo + (c_hi - c_lo) / 2;
                ranges.push(((m_lo, m_hi), (mid + 1, c_hi)));
                ranges.push(((m_lo, m_hi), (c_lo, mid)));
            }
        }
        None
    }
}

/// Smallest value in `lo..=hi` that `test` accepts, with its witness.
///
/// `hi` is known to be achievable; when nothing below it is, the witness is
/// `None` and the caller keeps the one it already has.
fn smallest<W>(
    mut lo: u64,
    mut hi: u64,
    mut test: impl FnMut(u64) -> Option<W>,
) -> (u64, Option<W>) {
    if let Some(found) = test(lo) {
        return (lo, Some(found));
    }
    let mut best = None;
    lo += 1;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match test(mid) {
            Some(found) => {
                hi = mid;
                best = Some(found);
            }
            None => lo = mid + 1,
        }
    }
    (hi, best)
}
