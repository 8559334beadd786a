//! Bin completion — can a task set be split into bins that all fit a window?
//!
//! Both searches ask this question over and over: given the tasks still to
//! place and a number of bins, is there a split where every bin's
//! `(load, count)` falls inside a [`Window`]? [`Packer`] answers it one bin
//! at a time. Each bin is built around the heaviest task left, and its other
//! members are enumerated heaviest first.
//!
//! Pruning:
//! - **Bin range**: what the other bins can absorb bounds what this bin
//!   may take, in load and in count
//! - **Equal weights**: equally heavy tasks are interchangeable, so each
//!   depth tries only the first of a run
//! - **Dead states**: a `(cursor, load, count)` state that led to no
//!   closing is not expanded again while building the same bin
//! - **Failed remainders**: a task set that could not be split is
//!   remembered for the rest of the query
//!
//! The search keeps its own stack, so its depth is not limited by the call
//! stack.

use std::collections::{HashMap, HashSet};
use std::iter;

use crate::balance::TaskLoad;

/// Fixed-capacity set of task positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct TaskSet {
    words: Vec<u64>,
}

impl TaskSet {
    pub(crate) fn empty(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
        }
    }

    pub(crate) fn full(capacity: usize) -> Self {
        let mut set = Self::empty(capacity);
        for position in 0..capacity {
            set.insert(position);
        }
        set
    }

    pub(crate) fn insert(&mut self, position: usize) {
        self.words[position / 64] |= 1u64 << (position % 64);
    }

    pub(crate) fn remove(&mut self, position: usize) {
        self.words[position / 64] &= !(1u64 << (position % 64));
    }

    /// Members in ascending order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            let mut bits = word;
            iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(index * 64 + bit)
            })
        })
    }
}

/// Bounds every bin must respect.
///
/// A bin fits when its load and task count fall in the two inclusive ranges
/// and its `(load, count)` pair does not sort below `floor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Window {
    load: (u64, u64),
    count: (usize, usize),
    floor: (u64, usize),
}

/// Load and count range for a single bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BinRange {
    pub(crate) load: (u64, u64),
    pub(crate) count: (usize, usize),
}

impl BinRange {
    fn point(load: u64, count: usize) -> Self {
        Self {
            load: (load, load),
            count: (count, count),
        }
    }
}

impl Window {
    pub(crate) fn new(load: (u64, u64), count: (usize, usize)) -> Self {
        Self::above(load, count, (0, 0))
    }

    /// Window whose bins must also sort at or above `floor`.
    pub(crate) fn above(load: (u64, u64), count: (usize, usize), floor: (u64, usize)) -> Self {
        let load = (load.0.max(floor.0), load.1);
        // A bin pinned to the floor load needs at least the floor count.
        let count = if load.1 <= floor.0 {
            (count.0.max(floor.1), count.1)
        } else {
            count
        };
        Self { load, count, floor }
    }

    pub(crate) fn admits(&self, load: u64, count: usize) -> bool {
        (self.load.0..=self.load.1).contains(&load)
            && (self.count.0..=self.count.1).contains(&count)
            && (load, count) >= self.floor
    }

    /// Range for the bin holding the heaviest of `count` tasks totalling
    /// `load`, split over `bins` bins. `None` when no split can fit.
    pub(crate) fn anchor_range(&self, load: u64, count: usize, bins: usize) -> Option<BinRange> {
        let n = bins as u64;
        if load < n.saturating_mul(self.load.0)
            || load > n.saturating_mul(self.load.1)
            || count < bins.saturating_mul(self.count.0)
            || count > bins.saturating_mul(self.count.1)
        {
            return None;
        }
        match bins {
            0 => return Some(BinRange::point(0, 0)),
            1 => return self.admits(load, count).then(|| BinRange::point(load, count)),
            _ if count == 0 => return self.admits(0, 0).then(|| BinRange::point(0, 0)),
            _ => {}
        }

        let others = bins - 1;
        let m = others as u64;
        let load_range = (
            self.load.0.max(load.saturating_sub(m.saturating_mul(self.load.1))),
            self.load.1.min(load.saturating_sub(m.saturating_mul(self.load.0))),
        );
        let mut count_range = (
            self.count.0.max(count.saturating_sub(others.saturating_mul(self.count.1))),
            self.count.1.min(count.saturating_sub(others.saturating_mul(self.count.0))),
        );
        if load_range.0 > load_range.1 || count_range.0 > count_range.1 {
            return None;
        }

        if bins == 2 {
            // The other bin is whatever is left, so both must clear the floor.
            let (floor_load, floor_count) = self.floor;
            let mut valid = (count_range.0..=count_range.1).filter(|&c| {
                let lo = if c < floor_count {
                    load_range.0.max(floor_load + 1)
                } else {
                    load_range.0
                };
                let hi = if count - c < floor_count {
                    load_range.1.min(load.saturating_sub(floor_load + 1))
                } else {
                    load_range.1
                };
                lo <= hi
            });
            let first = valid.next()?;
            count_range = (first, valid.last().unwrap_or(first));
        }

        Some(BinRange {
            load: load_range,
            count: count_range,
        })
    }
}

/// Window queries over one task set, with results cached per query.
///
/// Tasks are addressed by position: heaviest first, ties by ascending id.
pub(crate) struct Packer {
    weights: Vec<u64>,
    /// Task index at each position.
    order: Vec<usize>,
    /// Position of each task index.
    positions: Vec<usize>,
    cache: HashMap<(TaskSet, usize, Window), Option<Vec<Vec<usize>>>>,
    explored: u64,
}

impl Packer {
    pub(crate) fn new(tasks: &[TaskLoad]) -> Self {
        let mut order: Vec<usize> = (0..tasks.len()).collect();
        order.sort_by(|&a, &b| {
            tasks[b]
                .consumption
                .cmp(&tasks[a].consumption)
                .then(tasks[a].id.cmp(&tasks[b].id))
        });
        let weights = order.iter().map(|&i| tasks[i].consumption).collect();
        let mut positions = vec![0; tasks.len()];
        for (position, &task) in order.iter().enumerate() {
            positions[task] = position;
        }
        Self {
            weights,
            order,
            positions,
            cache: HashMap::new(),
            explored: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.weights.len()
    }

    pub(crate) fn weight(&self, position: usize) -> u64 {
        self.weights[position]
    }

    pub(crate) fn task_at(&self, position: usize) -> usize {
        self.order[position]
    }

    pub(crate) fn position_of(&self, task: usize) -> usize {
        self.positions[task]
    }

    /// Search states visited so far, across all queries.
    pub(crate) fn explored(&self) -> u64 {
        self.explored
    }

    /// Split `remaining` into exactly `bins` bins that all fit `window`.
    /// Returned bins hold positions.
    pub(crate) fn pack(
        &mut self,
        remaining: &TaskSet,
        bins: usize,
        window: Window,
    ) -> Option<Vec<Vec<usize>>> {
        let key = (remaining.clone(), bins, window);
        if let Some(known) = self.cache.get(&key) {
            return known.clone();
        }
        let found = self.search(remaining.clone(), bins, &window);
        self.cache.insert(key, found.clone());
        found
    }

    fn search(
        &mut self,
        remaining: TaskSet,
        bins: usize,
        window: &Window,
    ) -> Option<Vec<Vec<usize>>> {
        let mut failed = HashSet::new();
        let mut stack = match self.open(remaining, bins, window, &failed) {
            Opened::Solved(split) => return Some(split),
            Opened::Failed => return None,
            Opened::Bin(bin) => vec![bin],
        };
        // Closings whose outcome depends on more than the bin's load and
        // count. A subtree that saw none of them and found nothing is dead.
        let mut uncertain = 0u64;

        while let Some(bin) = stack.last_mut() {
            self.explored += 1;

            if !bin.fresh {
                if !bin.advance() {
                    bin.settle(uncertain);
                    backtrack(&mut stack, &mut failed);
                }
                continue;
            }
            bin.fresh = false;
            if bin.is_dead() || bin.pruned() {
                backtrack(&mut stack, &mut failed);
                continue;
            }
            bin.marks.push(uncertain);
            if !bin.closes(window) {
                continue;
            }

            if bin.bins > 2 {
                uncertain += 1;
            }
            let mut rest = bin.remaining.clone();
            for position in bin.members() {
                rest.remove(position);
            }
            let rest_bins = bin.bins - 1;
            match self.open(rest, rest_bins, window, &failed) {
                Opened::Solved(tail) => {
                    let mut split: Vec<Vec<usize>> =
                        stack.iter().map(|b| b.members().collect()).collect();
                    split.extend(tail);
                    return Some(split);
                }
                Opened::Failed => {}
                Opened::Bin(next) => stack.push(next),
            }
        }
        None
    }

    /// Start filling the bin that holds the heaviest task in `remaining`,
    /// or settle the query outright when no choice is left to make.
    fn open(
        &self,
        remaining: TaskSet,
        bins: usize,
        window: &Window,
        failed: &HashSet<(TaskSet, usize)>,
    ) -> Opened {
        let items: Vec<usize> = remaining.iter().collect();
        let load: u64 = items.iter().map(|&p| self.weights[p]).sum();
        let Some(range) = window.anchor_range(load, items.len(), bins) else {
            return Opened::Failed;
        };
        if bins == 0 {
            return Opened::Solved(Vec::new());
        }
        if items.is_empty() {
            return Opened::Solved(vec![Vec::new(); bins]);
        }
        if bins == 1 {
            return Opened::Solved(vec![items]);
        }

        let key = (remaining, bins);
        if failed.contains(&key) {
            return Opened::Failed;
        }
        let (remaining, bins) = key;
        let anchor = items[0];
        if self.weights[anchor] > range.load.1 {
            return Opened::Failed;
        }
        let candidates = items[1..].iter().map(|&p| (p, self.weights[p])).collect();
        Opened::Bin(OpenBin::new(
            remaining,
            bins,
            (anchor, self.weights[anchor]),
            candidates,
            range,
        ))
    }
}

enum Opened {
    Solved(Vec<Vec<usize>>),
    Failed,
    Bin(OpenBin),
}

/// Step back one member, or give up on the bin on top of the stack.
fn backtrack(stack: &mut Vec<OpenBin>, failed: &mut HashSet<(TaskSet, usize)>) {
    if stack.last_mut().is_some_and(OpenBin::retreat) {
        return;
    }
    if let Some(bin) = stack.pop() {
        failed.insert((bin.remaining, bin.bins));
    }
}

/// A bin under construction, with the subset walk over its candidates.
struct OpenBin {
    /// Tasks available before this bin, the anchor included.
    remaining: TaskSet,
    /// Bins still to fill, this one included.
    bins: usize,
    anchor: usize,
    candidates: Vec<usize>,
    weights: Vec<u64>,
    /// `suffix[j]` = total weight of `candidates[j..]`.
    suffix: Vec<u64>,
    /// First index after `j` holding a different weight.
    next_distinct: Vec<usize>,
    range: BinRange,
    /// Indices into `candidates`, ascending.
    picked: Vec<usize>,
    /// Next candidate to try at each depth, and where that depth began.
    cursor: Vec<usize>,
    starts: Vec<usize>,
    marks: Vec<u64>,
    dead: HashSet<(usize, u64, usize)>,
    load: u64,
    fresh: bool,
}

impl OpenBin {
    fn new(
        remaining: TaskSet,
        bins: usize,
        (anchor, anchor_load): (usize, u64),
        candidates: Vec<(usize, u64)>,
        range: BinRange,
    ) -> Self {
        let (candidates, weights): (Vec<usize>, Vec<u64>) = candidates.into_iter().unzip();
        let m = weights.len();
        let mut suffix = vec![0u64; m + 1];
        for j in (0..m).rev() {
            suffix[j] = suffix[j + 1] + weights[j];
        }
        let mut next_distinct = vec![m; m];
        for j in (0..m.saturating_sub(1)).rev() {
            next_distinct[j] = if weights[j] == weights[j + 1] {
                next_distinct[j + 1]
            } else {
                j + 1
            };
        }
        Self {
            remaining,
            bins,
            anchor,
            candidates,
            weights,
            suffix,
            next_distinct,
            range,
            picked: Vec::new(),
            cursor: vec![0],
            starts: vec![0],
            marks: Vec::new(),
            dead: HashSet::new(),
            load: anchor_load,
            fresh: true,
        }
    }

    fn count(&self) -> usize {
        self.picked.len() + 1
    }

    fn state(&self) -> (usize, u64, usize) {
        let start = self.starts.last().copied().unwrap_or(self.candidates.len());
        (start, self.load, self.count())
    }

    fn members(&self) -> impl Iterator<Item = usize> + '_ {
        iter::once(self.anchor).chain(self.picked.iter().map(|&j| self.candidates[j]))
    }

    fn is_dead(&self) -> bool {
        self.dead.contains(&self.state())
    }

    /// No extension of the current members can land in range.
    fn pruned(&self) -> bool {
        let m = self.candidates.len();
        let (start, load, count) = self.state();
        let need = self.range.count.0.saturating_sub(count);
        if need > m - start {
            return true;
        }
        // The lightest `need` candidates already overshoot.
        if need > 0 && load + self.suffix[m - need] > self.range.load.1 {
            return true;
        }
        // The heaviest candidates that still fit the count cannot reach.
        let room = self.range.count.1.saturating_sub(count);
        let reachable = self.suffix[start] - self.suffix[(start + room).min(m)];
        load + reachable < self.range.load.0
    }

    fn closes(&self, window: &Window) -> bool {
        let count = self.count();
        self.load >= self.range.load.0
            && count >= self.range.count.0
            && window.admits(self.load, count)
    }

    /// Descend into the next candidate at this depth.
    fn advance(&mut self) -> bool {
        if self.count() >= self.range.count.1 {
            return false;
        }
        let Some(&from) = self.cursor.last() else {
            return false;
        };
        for j in from..self.candidates.len() {
            let load = self.load + self.weights[j];
            if load + self.suffix[j + 1] < self.range.load.0 {
                break;
            }
            if load <= self.range.load.1 {
                if let Some(next) = self.cursor.last_mut() {
                    *next = self.next_distinct[j];
                }
                self.picked.push(j);
                self.cursor.push(j + 1);
                self.starts.push(j + 1);
                self.load = load;
                self.fresh = true;
                return true;
            }
        }
        false
    }

    /// Record the current state as dead if nothing uncertain happened
    /// below it.
    fn settle(&mut self, uncertain: u64) {
        if self.marks.pop() == Some(uncertain) {
            let state = self.state();
            self.dead.insert(state);
        }
    }

    /// Drop the last picked member. False at the bin's root.
    fn retreat(&mut self) -> bool {
        let Some(j) = self.picked.pop() else {
            return false;
        };
        self.cursor.pop();
        self.starts.pop();
        self.load -= self.weights[j];
        true
    }
}
