//! Dependency bookkeeping for formula cells.
//!
//! Both edge directions are kept as adjacency maps for O(1) lookups:
//!
//! ```text
//! preds[B] = positions the formula at B reads   (B's forward references)
//! succs[A] = positions whose formulas read A    (A's dependents)
//! ```
//!
//! # Invariants
//!
//! 1. **Bidirectional consistency:** if A ∈ preds[B] then B ∈ succs[A], and
//!    vice versa.
//! 2. **No dangling entries:** empty sets are removed, not stored.
//! 3. **No duplicate edges:** set semantics enforced by `FxHashSet`.
//! 4. **Atomic updates:** `replace_edges` is the only mutator that touches
//!    both maps.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::position::Position;

#[derive(Clone, Debug, Default)]
pub struct DepGraph {
    preds: FxHashMap<Position, FxHashSet<Position>>,
    succs: FxHashMap<Position, FxHashSet<Position>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positions the formula at `pos` reads (its forward set).
    pub fn precedents(&self, pos: Position) -> impl Iterator<Item = Position> + '_ {
        self.preds
            .get(&pos)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Positions whose formulas read `pos` (its reverse set).
    pub fn dependents(&self, pos: Position) -> impl Iterator<Item = Position> + '_ {
        self.succs
            .get(&pos)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// Replace all forward edges of a cell atomically.
    ///
    /// 1. Removes the cell from all its old precedents' dependent sets
    /// 2. Clears the cell's precedent set
    /// 3. Adds the cell to all new precedents' dependent sets
    /// 4. Stores the cell's new precedent set
    ///
    /// Pass an empty set to clear all edges for this cell. The cell's own
    /// dependent set is untouched: replacement preserves who depends on it.
    pub fn replace_edges(&mut self, cell: Position, new_preds: FxHashSet<Position>) {
        if let Some(old_preds) = self.preds.remove(&cell) {
            for pred in old_preds {
                if let Some(deps) = self.succs.get_mut(&pred) {
                    deps.remove(&cell);
                    if deps.is_empty() {
                        self.succs.remove(&pred);
                    }
                }
            }
        }

        if new_preds.is_empty() {
            return;
        }

        for pred in &new_preds {
            self.succs.entry(*pred).or_default().insert(cell);
        }

        self.preds.insert(cell, new_preds);
    }

    /// Clear all forward edges for a cell (formula removed or cell deleted).
    pub fn clear_cell(&mut self, cell: Position) {
        self.replace_edges(cell, FxHashSet::default());
    }

    /// Would pointing `cell` at `new_preds` close a loop?
    ///
    /// Does not modify the graph. A loop appears exactly when one of the
    /// prospective precedents already depends on `cell`, so this walks the
    /// dependent edges out of `cell` looking for any of `new_preds`.
    pub fn would_create_cycle(&self, cell: Position, new_preds: &[Position]) -> bool {
        if new_preds.contains(&cell) {
            return true;
        }

        let new_preds_set: FxHashSet<Position> = new_preds.iter().copied().collect();
        let mut visited = FxHashSet::default();
        let mut stack = vec![cell];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(deps) = self.succs.get(&current) {
                for &dep in deps {
                    if new_preds_set.contains(&dep) {
                        return true;
                    }
                    stack.push(dep);
                }
            }
        }

        false
    }

    /// Check all invariants. Panics if any are violated.
    ///
    /// Only available in test builds.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (cell, preds) in &self.preds {
            for pred in preds {
                assert!(
                    self.succs.get(pred).is_some_and(|s| s.contains(cell)),
                    "missing dependent edge: {:?} should list {:?}",
                    pred,
                    cell
                );
            }
        }

        for (cell, dependents) in &self.succs {
            for dep in dependents {
                assert!(
                    self.preds.get(dep).is_some_and(|s| s.contains(cell)),
                    "missing precedent edge: {:?} should list {:?}",
                    dep,
                    cell
                );
            }
        }

        for (cell, preds) in &self.preds {
            assert!(!preds.is_empty(), "empty precedent set stored for {:?}", cell);
        }
        for (cell, succs) in &self.succs {
            assert!(!succs.is_empty(), "empty dependent set stored for {:?}", cell);
        }
    }
}
