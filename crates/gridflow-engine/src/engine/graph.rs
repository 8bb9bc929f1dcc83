//! Dependency graph between formula cells and their inputs.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B's formula reads A"  (A is a precedent of B)
//! ```
//!
//! Following outgoing edges answers "what must be recomputed when A changes?".

use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::cell_id::CellId;

/// Bidirectional adjacency for formula bindings.
///
/// # Invariants
///
/// 1. If A ∈ preds[B] then B ∈ succs[A], and vice versa.
/// 2. Empty sets are removed, not stored.
/// 3. `replace_edges` is the only mutator.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    /// B -> {cells B's formula reads}
    preds: FxHashMap<CellId, FxHashSet<CellId>>,
    /// A -> {cells whose formulas read A}
    succs: FxHashMap<CellId, FxHashSet<CellId>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells this cell's formula reads.
    pub fn precedents(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.preds
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Cells whose formulas read this cell.
    pub fn dependents(&self, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.succs
            .get(&cell)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    pub fn has_dependents(&self, cell: CellId) -> bool {
        self.succs.contains_key(&cell)
    }

    /// Replace all incoming edges of `target` at once.
    ///
    /// Pass an empty slice to detach the cell entirely. Duplicate inputs
    /// collapse to one edge.
    pub fn replace_edges(&mut self, target: CellId, inputs: &[CellId]) {
        if let Some(old) = self.preds.remove(&target) {
            for pred in old {
                if let Some(deps) = self.succs.get_mut(&pred) {
                    deps.remove(&target);
                    if deps.is_empty() {
                        self.succs.remove(&pred);
                    }
                }
            }
        }

        if inputs.is_empty() {
            return;
        }

        let new_preds: FxHashSet<CellId> = inputs.iter().copied().collect();
        for pred in &new_preds {
            self.succs.entry(*pred).or_default().insert(target);
        }
        self.preds.insert(target, new_preds);
    }

    /// Would reading `inputs` from `target` close a loop?
    ///
    /// Returns the offending path (starting and ending at `target`) if so.
    /// Does not modify the graph.
    pub fn would_create_cycle(&self, target: CellId, inputs: &[CellId]) -> Option<Vec<CellId>> {
        if inputs.contains(&target) {
            return Some(vec![target, target]);
        }

        // A loop exists iff some input is already downstream of target.
        let wanted: FxHashSet<CellId> = inputs.iter().copied().collect();
        let mut parent: FxHashMap<CellId, CellId> = FxHashMap::default();
        let mut visited = FxHashSet::default();
        let mut stack = vec![target];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let mut next: Vec<CellId> = self.dependents(current).collect();
            next.sort_unstable();
            for dep in next {
                if visited.contains(&dep) {
                    continue;
                }
                parent.entry(dep).or_insert(current);
                if wanted.contains(&dep) {
                    return Some(trace_path(target, dep, &parent));
                }
                stack.push(dep);
            }
        }

        None
    }

    /// Transitive dependents of `changed` in recomputation order.
    ///
    /// `changed` itself is excluded. Every returned cell appears after all of
    /// its precedents that are also in the result. Ties are broken by
    /// ascending id. Fails if the reachable sub-graph contains a loop.
    pub fn affected_order(&self, changed: CellId) -> Result<Vec<CellId>, Vec<CellId>> {
        let mut affected: FxHashSet<CellId> = FxHashSet::default();
        let mut stack: Vec<CellId> = self.dependents(changed).collect();
        while let Some(cell) = stack.pop() {
            if affected.insert(cell) {
                stack.extend(self.dependents(cell));
            }
        }
        // Only reachable through a loop back to the origin.
        if affected.remove(&changed) {
            return Err(vec![changed]);
        }
        if affected.is_empty() {
            return Ok(Vec::new());
        }

        // Kahn's algorithm over the induced sub-graph.
        let mut in_degree: FxHashMap<CellId, usize> = affected
            .iter()
            .map(|&cell| {
                let count = self.precedents(cell).filter(|p| affected.contains(p)).count();
                (cell, count)
            })
            .collect();

        // Min-heap, so the smallest ready id comes out first.
        let mut ready: BinaryHeap<Reverse<CellId>> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&cell, _)| Reverse(cell))
            .collect();

        let mut order = Vec::with_capacity(affected.len());
        while let Some(Reverse(cell)) = ready.pop() {
            order.push(cell);
            for dep in self.dependents(cell) {
                if let Some(deg) = in_degree.get_mut(&dep) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(Reverse(dep));
                    }
                }
            }
        }

        if order.len() < affected.len() {
            let placed: FxHashSet<CellId> = order.iter().copied().collect();
            let mut stuck: Vec<CellId> = affected.difference(&placed).copied().collect();
            stuck.sort_unstable();
            return Err(stuck);
        }

        Ok(order)
    }

    /// Check all invariants. Panics if any are violated.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (cell, preds) in &self.preds {
            assert!(!preds.is_empty(), "empty pred set stored for {cell}");
            for pred in preds {
                assert!(
                    self.succs.get(pred).is_some_and(|s| s.contains(cell)),
                    "{pred} -> {cell} missing from succs"
                );
            }
        }
        for (cell, succs) in &self.succs {
            assert!(!succs.is_empty(), "empty succ set stored for {cell}");
            for succ in succs {
                assert!(
                    self.preds.get(succ).is_some_and(|p| p.contains(cell)),
                    "{cell} -> {succ} missing from preds"
                );
            }
        }
    }

    /// Insert edges without the cycle check, to exercise defensive paths.
    #[cfg(test)]
    pub(crate) fn force_edges(&mut self, target: CellId, inputs: &[CellId]) {
        self.replace_edges(target, inputs);
    }
}

/// Walk `parent` links back from `found` to `target`, producing
/// `target -> ... -> found -> target`.
fn trace_path(target: CellId, found: CellId, parent: &FxHashMap<CellId, CellId>) -> Vec<CellId> {
    let mut path = vec![found];
    let mut current = found;
    while current != target {
        match parent.get(&current) {
            Some(&p) => {
                path.push(p);
                current = p;
            }
            None => break,
        }
    }
    path.reverse();
    path.push(target);
    path
}
