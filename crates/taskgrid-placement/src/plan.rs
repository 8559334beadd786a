//! Rebalance plan — turns the optimal spread into one concrete assignment.
//!
//! Many assignments share the optimal spread. The plan picks exactly one:
//! 1. Nodes in ascending id order carry non-decreasing `(load, task count)`
//!    pairs (a heavier node never has a smaller id; among equally loaded
//!    nodes the smaller id never holds more tasks)
//! 2. Among those, each node's ascending task-id list, read node by node,
//!    forms the lexicographically smallest sequence
//!
//! Rule 2 is realised by filling nodes in id order. Each node takes the
//! lexicographically first task set that fits the spread and leaves a
//! remainder the later nodes can still split, which the [`Packer`] decides.
//! Once a node is chosen it is never revisited.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use taskgrid_state::{NodeId, TaskId};

use crate::balance::{Spread, TaskLoad, optimal_balance};
use crate::pack::{Packer, TaskSet, Window};

/// A complete node → tasks assignment for the whole task set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalancePlan {
    /// Every node, with its task ids in ascending order (possibly empty).
    pub assignments: BTreeMap<NodeId, Vec<TaskId>>,
    /// Total consumption per node under this plan.
    pub node_loads: BTreeMap<NodeId, u64>,
    pub spread: Spread,
}

impl RebalancePlan {
    /// True when the load spread does not exceed `threshold`.
    pub fn fits(&self, threshold: u64) -> bool {
        self.spread.load <= threshold
    }

    /// Node a task is placed on by this plan.
    pub fn node_of(&self, task_id: TaskId) -> Option<NodeId> {
        self.assignments
            .iter()
            .find(|(_, tasks)| tasks.contains(&task_id))
            .map(|(node_id, _)| *node_id)
    }

    fn from_bins(
        tasks: &[TaskLoad],
        nodes: &[NodeId],
        bins: Vec<Vec<usize>>,
        spread: Spread,
    ) -> Self {
        let mut assignments = BTreeMap::new();
        let mut node_loads = BTreeMap::new();
        for (&node_id, bin) in nodes.iter().zip(bins) {
            let mut ids: Vec<TaskId> = bin.iter().map(|&i| tasks[i].id).collect();
            ids.sort_unstable();
            let load: u64 = bin.iter().map(|&i| tasks[i].consumption).sum();
            assignments.insert(node_id, ids);
            node_loads.insert(node_id, load);
        }
        Self {
            assignments,
            node_loads,
            spread,
        }
    }
}

/// Compute the optimal plan for `tasks` over `node_ids`.
///
/// Every task is placed, regardless of where it currently runs. Returns
/// `None` when there are no nodes.
pub fn compute_rebalance(tasks: &[TaskLoad], node_ids: &[NodeId]) -> Option<RebalancePlan> {
    let mut tasks = tasks.to_vec();
    tasks.sort_by_key(|t| t.id);
    let mut nodes = node_ids.to_vec();
    nodes.sort_unstable();
    nodes.dedup();

    let balance = optimal_balance(&tasks, nodes.len())?;

    let mut search = LexSearch::new(&tasks, nodes.len(), balance.spread);
    let bins = match search.run() {
        Some(bins) => bins,
        None => {
            warn!(
                spread = ?balance.spread,
                "ordered search found no plan, using balance witness"
            );
            ordered_witness(&tasks, balance.bins)
        }
    };
    debug!(
        tasks = tasks.len(),
        nodes = nodes.len(),
        explored = search.explored,
        packed = search.packer.explored(),
        load_spread = balance.spread.load,
        count_spread = balance.spread.count,
        "rebalance plan computed"
    );

    Some(RebalancePlan::from_bins(&tasks, &nodes, bins, balance.spread))
}

/// Arrange witness bins by `(load, count, ids)` so they satisfy the
/// node-order rule.
fn ordered_witness(tasks: &[TaskLoad], mut bins: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
    for bin in &mut bins {
        bin.sort_unstable();
    }
    bins.sort_by_cached_key(|bin| {
        let load: u64 = bin.iter().map(|&i| tasks[i].consumption).sum();
        (load, bin.len(), bin.clone())
    });
    bins
}

struct Placed {
    members: Vec<usize>,
    load: u64,
}

/// Node-by-node search over task subsets in lexicographic order.
///
/// Task indices refer to the id-sorted task slice, so index order is id
/// order.
struct LexSearch<'a> {
    tasks: &'a [TaskLoad],
    node_count: usize,
    target: Spread,
    total: u64,
    packer: Packer,
    used: Vec<bool>,
    remaining_load: u64,
    remaining_count: usize,
    placed: Vec<Placed>,
    explored: u64,
}

impl<'a> LexSearch<'a> {
    fn new(tasks: &'a [TaskLoad], node_count: usize, target: Spread) -> Self {
        let total: u64 = tasks.iter().map(|t| t.consumption).sum();
        Self {
            tasks,
            node_count,
            target,
            total,
            packer: Packer::new(tasks),
            used: vec![false; tasks.len()],
            remaining_load: total,
            remaining_count: tasks.len(),
            placed: Vec::with_capacity(node_count),
            explored: 0,
        }
    }

    fn run(&mut self) -> Option<Vec<Vec<usize>>> {
        for k in 0..self.node_count {
            let (members, load) = if k + 1 == self.node_count {
                // The last node takes whatever is left.
                let members = (0..self.tasks.len()).filter(|&i| !self.used[i]).collect();
                (members, self.remaining_load)
            } else {
                self.fill(k)?
            };
            self.commit(members, load);
        }
        Some(self.placed.drain(..).map(|p| p.members).collect())
    }

    /// The lexicographically first task set for node `k` that keeps the
    /// rest of the plan possible.
    ///
    /// Depth-first over ascending task indices with an explicit stack:
    /// `picked` holds the chosen indices, `cursor[d]` the next index to try
    /// at depth `d` and `starts[d]` where that depth began.
    fn fill(&mut self, k: usize) -> Option<(Vec<usize>, u64)> {
        let n = self.tasks.len();
        let mut suffix = vec![0u64; n + 1];
        for i in (0..n).rev() {
            let weight = if self.used[i] { 0 } else { self.tasks[i].consumption };
            suffix[i] = suffix[i + 1] + weight;
        }
        let (load_lo, load_hi, count_cap) = self.limits();
        let later_nodes = self.node_count - k - 1;

        let mut picked: Vec<usize> = Vec::new();
        let mut cursor = vec![0usize];
        let mut starts = vec![0usize];
        let mut load = 0u64;
        let mut fresh = true;
        // States known to lead nowhere. A state only counts as dead when no
        // set closed under it hinged on which tasks were picked.
        let mut dead: HashSet<(usize, u64, usize)> = HashSet::new();
        let mut marks: Vec<u64> = Vec::new();
        let mut uncertain = 0u64;

        loop {
            self.explored += 1;
            let depth = picked.len();

            if fresh {
                fresh = false;
                if !dead.contains(&(starts[depth], load, depth)) {
                    marks.push(uncertain);
                    let windows = self.closing_windows(k, load, depth);
                    if !windows.is_empty() {
                        if later_nodes >= 2 {
                            uncertain += 1;
                        }
                        if self.rest_fits(&picked, later_nodes, &windows) {
                            return Some((picked, load));
                        }
                    }
                    continue;
                }
            } else {
                if depth < count_cap {
                    let next = (cursor[depth]..n)
                        .filter(|&i| !self.used[i])
                        .take_while(|&i| load + suffix[i] >= load_lo)
                        .find(|&i| load + self.tasks[i].consumption <= load_hi);
                    if let Some(i) = next {
                        cursor[depth] = i + 1;
                        picked.push(i);
                        cursor.push(i + 1);
                        starts.push(i + 1);
                        load += self.tasks[i].consumption;
                        fresh = true;
                        continue;
                    }
                }
                if marks.pop() == Some(uncertain) {
                    dead.insert((starts[depth], load, depth));
                }
            }

            let i = picked.pop()?;
            cursor.pop();
            starts.pop();
            load -= self.tasks[i].consumption;
        }
    }

    /// Load range and count cap for the node being filled.
    fn limits(&self) -> (u64, u64, usize) {
        match (self.placed.first(), self.placed.last()) {
            (Some(first), Some(last)) => {
                let fewest = self.placed.iter().map(|p| p.members.len()).min().unwrap_or(0);
                (
                    last.load,
                    first.load + self.target.load,
                    fewest + self.target.count,
                )
            }
            _ => {
                let n = self.node_count as u64;
                (
                    self.total.div_ceil(n).saturating_sub(self.target.load),
                    self.total / n,
                    self.tasks.len() / self.node_count + self.target.count,
                )
            }
        }
    }

    /// Windows the later nodes must fit if node `k` closes with this load
    /// and count, one per admissible lowest count. Empty when node `k` may
    /// not close here, or no split of what is left can add up.
    fn closing_windows(&self, k: usize, load: u64, count: usize) -> Vec<Window> {
        let first_load = match (self.placed.first(), self.placed.last()) {
            (Some(first), Some(last)) => {
                if (load, count) < (last.load, last.members.len())
                    || load > first.load + self.target.load
                {
                    return Vec::new();
                }
                first.load
            }
            _ => {
                // The first node is the lightest, so it sits at or below
                // the average and within the spread of the heaviest.
                let n = self.node_count as u64;
                if load > self.total / n || load + self.target.load < self.total.div_ceil(n) {
                    return Vec::new();
                }
                load
            }
        };

        let counts = self.placed.iter().map(|p| p.members.len()).chain([count]);
        let min_count = counts.clone().min().unwrap_or(count);
        let max_count = counts.max().unwrap_or(count);
        if max_count - min_count > self.target.count {
            return Vec::new();
        }

        let later_nodes = self.node_count - k - 1;
        let rest_load = self.remaining_load - load;
        let rest_count = self.remaining_count - count;
        (max_count.saturating_sub(self.target.count)..=min_count)
            .map(|lowest| {
                Window::above(
                    (first_load, first_load + self.target.load),
                    (lowest, lowest + self.target.count),
                    (load, count),
                )
            })
            .filter(|window| window.anchor_range(rest_load, rest_count, later_nodes).is_some())
            .collect()
    }

    /// Whether the unused tasks minus `picked` split over `later_nodes`
    /// nodes inside one of `windows`.
    fn rest_fits(&mut self, picked: &[usize], later_nodes: usize, windows: &[Window]) -> bool {
        let mut rest = TaskSet::empty(self.tasks.len());
        for i in (0..self.tasks.len()).filter(|&i| !self.used[i]) {
            rest.insert(self.packer.position_of(i));
        }
        for &i in picked {
            rest.remove(self.packer.position_of(i));
        }
        windows
            .iter()
            .any(|&window| self.packer.pack(&rest, later_nodes, window).is_some())
    }

    fn commit(&mut self, members: Vec<usize>, load: u64) {
        for &i in &members {
            self.used[i] = true;
        }
        self.remaining_load -= load;
        self.remaining_count -= members.len();
        self.placed.push(Placed { members, load });
    }
}

#[cfg(test)]
mod tests {
    use std::iter;

    use super::*;

    fn loads(pairs: &[(TaskId, u64)]) -> Vec<TaskLoad> {
        pairs
            .iter()
            .map(|&(id, consumption)| TaskLoad { id, consumption })
            .collect()
    }

    fn plan(pairs: &[(TaskId, u64)], nodes: &[NodeId]) -> RebalancePlan {
        compute_rebalance(&loads(pairs), nodes).unwrap()
    }

    fn lists(plan: &RebalancePlan) -> Vec<Vec<TaskId>> {
        plan.assignments.values().cloned().collect()
    }

    #[test]
    fn no_nodes_yields_no_plan() {
        assert!(compute_rebalance(&loads(&[(1, 5)]), &[]).is_none());
    }

    #[test]
    fn equal_tasks_fill_lowest_node_with_lowest_ids() {
        let p = plan(&[(1, 10), (2, 10), (3, 10), (4, 10)], &[1, 2]);
        assert_eq!(lists(&p), vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(p.spread, Spread { load: 0, count: 0 });
        assert_eq!(p.node_loads.values().copied().collect::<Vec<_>>(), vec![20, 20]);
    }

    #[test]
    fn lexicographic_choice_among_balanced_splits() {
        // {1,4} / {2,3} and {2,3} / {1,4} both balance 5/5.
        let p = plan(&[(1, 1), (2, 2), (3, 3), (4, 4)], &[1, 2]);
        assert_eq!(lists(&p), vec![vec![1, 4], vec![2, 3]]);
    }

    #[test]
    fn lighter_load_goes_to_smaller_node_id() {
        let p = plan(&[(1, 7), (2, 3)], &[1, 2]);
        assert_eq!(lists(&p), vec![vec![2], vec![1]]);
        assert_eq!(p.spread.load, 4);
    }

    #[test]
    fn equal_loads_put_fewer_tasks_on_smaller_node_id() {
        // {1,2} / {3} is lexicographically smaller but gives node 1 more
        // tasks at the same load.
        let p = plan(&[(1, 3), (2, 3), (3, 6)], &[1, 2]);
        assert_eq!(lists(&p), vec![vec![3], vec![1, 2]]);
        assert_eq!(p.spread, Spread { load: 0, count: 1 });
    }

    #[test]
    fn count_spread_breaks_load_ties() {
        let p = plan(&[(1, 10), (2, 10), (3, 0), (4, 0)], &[1, 2]);
        assert_eq!(lists(&p), vec![vec![1, 3], vec![2, 4]]);
    }

    #[test]
    fn load_spread_dominates_count_spread() {
        let p = plan(&[(1, 6), (2, 2), (3, 2), (4, 2)], &[1, 2]);
        assert_eq!(lists(&p), vec![vec![1], vec![2, 3, 4]]);
        assert_eq!(p.spread, Spread { load: 0, count: 2 });
    }

    #[test]
    fn surplus_nodes_stay_empty_at_low_ids() {
        let p = plan(&[(1, 4)], &[1, 2, 3]);
        assert_eq!(lists(&p), vec![vec![], vec![], vec![1]]);
        assert_eq!(p.node_of(1), Some(3));
        assert!(!p.fits(3));
        assert!(p.fits(4));
    }

    #[test]
    fn node_ids_need_not_be_contiguous() {
        let tasks = [(5, 10), (6, 10), (7, 10), (8, 10), (9, 10), (10, 10)];
        let p = plan(&tasks, &[30, 4, 12]);
        let expected: BTreeMap<NodeId, Vec<TaskId>> =
            [(4, vec![5, 6]), (12, vec![7, 8]), (30, vec![9, 10])].into_iter().collect();
        assert_eq!(p.assignments, expected);
    }

    #[test]
    fn plan_is_independent_of_input_order() {
        let a = plan(&[(3, 4), (1, 9), (2, 5), (4, 5)], &[2, 1]);
        let b = plan(&[(1, 9), (2, 5), (3, 4), (4, 5)], &[1, 2]);
        assert_eq!(a, b);
    }

    #[test]
    fn plan_serializes_to_json() {
        let p = plan(&[(1, 10), (2, 10)], &[1, 2]);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["spread"]["load"], 0);
        assert_eq!(json["assignments"]["1"], serde_json::json!([1]));
    }

    fn numbered(weights: impl Iterator<Item = u64>) -> Vec<TaskLoad> {
        weights
            .enumerate()
            .map(|(i, consumption)| TaskLoad {
                id: i as TaskId + 1,
                consumption,
            })
            .collect()
    }

    #[test]
    fn many_equal_tasks_split_in_id_order() {
        let tasks = numbered(iter::repeat_n(1, 20_000));
        let p = compute_rebalance(&tasks, &[1, 2]).unwrap();
        assert_eq!(p.spread, Spread::default());
        assert_eq!(p.assignments[&1], (1..=10_000).collect::<Vec<TaskId>>());
        assert_eq!(p.assignments[&2], (10_001..=20_000).collect::<Vec<TaskId>>());
    }

    #[test]
    fn equal_tasks_over_three_nodes_put_the_extra_task_last() {
        let tasks = numbered(iter::repeat_n(1, 2_000));
        let p = compute_rebalance(&tasks, &[1, 2, 3]).unwrap();
        assert_eq!(p.spread, Spread { load: 1, count: 1 });
        assert_eq!(p.assignments[&1], (1..=666).collect::<Vec<TaskId>>());
        assert_eq!(p.assignments[&2], (667..=1_333).collect::<Vec<TaskId>>());
        assert_eq!(p.assignments[&3], (1_334..=2_000).collect::<Vec<TaskId>>());
    }

    #[test]
    fn thirty_mixed_tasks_over_five_nodes() {
        let tasks = numbered((1..=30u64).map(|i| (i * i * 13) % 211 + 1));
        let p = compute_rebalance(&tasks, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(p.spread, Spread { load: 1, count: 0 });
        assert_eq!(
            lists(&p),
            vec![
                vec![1, 2, 3, 4, 5, 27],
                vec![6, 7, 8, 9, 24, 26],
                vec![10, 11, 12, 13, 23, 29],
                vec![14, 16, 17, 18, 19, 30],
                vec![15, 20, 21, 22, 25, 28],
            ]
        );
        let loads: Vec<u64> = p.node_loads.values().copied().collect();
        assert_eq!(loads, vec![703, 704, 704, 704, 704]);
    }

    #[test]
    fn thousands_of_small_weights_over_three_nodes() {
        let tasks = numbered((0..2_000u64).map(|i| (i * 37) % 11 + 1));
        let p = compute_rebalance(&tasks, &[1, 2, 3]).unwrap();
        assert_eq!(p.spread, Spread { load: 0, count: 1 });

        let sizes: Vec<usize> = p.assignments.values().map(Vec::len).collect();
        assert_eq!(sizes, vec![666, 667, 667]);
        let firsts: Vec<TaskId> = p.assignments.values().map(|ids| ids[0]).collect();
        assert_eq!(firsts, vec![1, 664, 1_332]);
        assert!(p.node_loads.values().all(|&load| load == 4_000));
    }

    // ── Exhaustive cross-check ────────────────────────────────────

    /// Best assignment by direct enumeration of every task → node mapping.
    fn brute_force(tasks: &[TaskLoad], nodes: &[NodeId]) -> (Spread, Vec<Vec<TaskId>>) {
        let n = nodes.len();
        let total = n.pow(tasks.len() as u32);
        let mut best: Option<(Spread, Vec<Vec<TaskId>>)> = None;

        for mut code in 0..total {
            let mut bins: Vec<Vec<TaskId>> = vec![Vec::new(); n];
            let mut totals = vec![0u64; n];
            for task in tasks {
                bins[code % n].push(task.id);
                totals[code % n] += task.consumption;
                code /= n;
            }
            for bin in &mut bins {
                bin.sort_unstable();
            }

            let ordered = (1..n)
                .all(|j| (totals[j - 1], bins[j - 1].len()) <= (totals[j], bins[j].len()));
            if !ordered {
                continue;
            }

            let counts: Vec<usize> = bins.iter().map(Vec::len).collect();
            let spread = Spread {
                load: totals.iter().max().unwrap() - totals.iter().min().unwrap(),
                count: counts.iter().max().unwrap() - counts.iter().min().unwrap(),
            };
            let candidate = (spread, bins);
            if best.as_ref().is_none_or(|b| candidate < *b) {
                best = Some(candidate);
            }
        }
        best.unwrap()
    }

    #[test]
    fn matches_exhaustive_enumeration() {
        let weight_sets: &[&[u64]] = &[
            &[5, 5, 5],
            &[1, 2, 3, 4, 5],
            &[8, 1, 1, 1, 1, 4],
            &[3, 3, 2, 2, 2],
            &[0, 0, 7, 7],
            &[10, 20, 30, 40, 50, 60],
            &[9, 4, 4, 3, 3, 2, 1],
            &[6, 6, 6, 1, 1, 1, 0],
            &[13, 2, 2, 2],
            &[4, 4, 4, 4, 4, 4, 4],
        ];

        for weights in weight_sets {
            // Interleave ids from both ends so id order and weight order differ.
            let len = weights.len();
            let tasks: Vec<TaskLoad> = weights
                .iter()
                .enumerate()
                .map(|(i, &w)| TaskLoad {
                    id: (if i % 2 == 0 { i / 2 + 1 } else { len - i / 2 }) as TaskId,
                    consumption: w,
                })
                .collect();

            for nodes in [&[1][..], &[1, 2][..], &[1, 2, 3][..], &[2, 5, 7, 9][..]] {
                let (spread, expected) = brute_force(&tasks, nodes);
                let plan = compute_rebalance(&tasks, nodes).unwrap();
                assert_eq!(
                    (plan.spread, lists(&plan)),
                    (spread, expected),
                    "weights {weights:?} over nodes {nodes:?}"
                );
            }
        }
    }
}
