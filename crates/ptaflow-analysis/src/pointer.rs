//! Points-to store
//!
//! The lattice value of the points-to analysis. Every program value doubles
//! as an abstract location, so a store maps a [`ValueId`] to the set of
//! values it may point to.
//!
//! ## Operations
//!
//! - `add_edge(loc, t)` → t ∈ pts(loc) (weak update)
//! - `add_set(loc, s)` → s ⊆ pts(loc) (weak update)
//! - `kill(loc)` → pts(loc) = ∅ (strong update)
//! - `merge(other)` → pts(l) ∪= other.pts(l) for every l

use ptaflow_core::{Program, ValueId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Set of locations a location may point to
pub type PointsToSet = BTreeSet<ValueId>;

/// Location → points-to set. Equality is structural.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointsToStore {
    pts: BTreeMap<ValueId, PointsToSet>,
}

impl PointsToStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current set of `loc`, registering it as empty if unseen
    pub fn get(&mut self, loc: ValueId) -> &PointsToSet {
        self.pts.entry(loc).or_default()
    }

    /// Current set of `loc` without registering it
    pub fn lookup(&self, loc: ValueId) -> Option<&PointsToSet> {
        self.pts.get(&loc)
    }

    /// Add `target` to pts(loc), return true if changed
    pub fn add_edge(&mut self, loc: ValueId, target: ValueId) -> bool {
        self.pts.entry(loc).or_default().insert(target)
    }

    /// Union `set` into pts(loc), return true if changed
    pub fn add_set(&mut self, loc: ValueId, set: &PointsToSet) -> bool {
        let dest = self.pts.entry(loc).or_default();
        let old_size = dest.len();
        dest.extend(set.iter().copied());
        dest.len() > old_size
    }

    /// Forget everything `loc` pointed to
    pub fn kill(&mut self, loc: ValueId) {
        self.pts.entry(loc).or_default().clear();
    }

    /// Per-location union with `other`, return true if changed
    pub fn merge(&mut self, other: &PointsToStore) -> bool {
        let mut changed = false;
        for (loc, set) in &other.pts {
            match self.pts.get_mut(loc) {
                Some(dest) => {
                    let old_size = dest.len();
                    dest.extend(set.iter().copied());
                    changed |= dest.len() > old_size;
                }
                None => {
                    self.pts.insert(*loc, set.clone());
                    changed = true;
                }
            }
        }
        changed
    }

    /// Lattice order: every set of `self` is contained in the matching set
    /// of `other` (absent locations count as empty)
    pub fn is_subset_of(&self, other: &PointsToStore) -> bool {
        self.pts.iter().all(|(loc, set)| {
            set.is_empty()
                || other
                    .pts
                    .get(loc)
                    .map_or(false, |theirs| set.is_subset(theirs))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValueId, &PointsToSet)> {
        self.pts.iter().map(|(loc, set)| (*loc, set))
    }

    /// Number of registered locations
    pub fn len(&self) -> usize {
        self.pts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pts.is_empty()
    }

    /// Render with value names
    pub fn display<'a>(&'a self, program: &'a Program) -> StoreDisplay<'a> {
        StoreDisplay {
            store: self,
            program,
        }
    }
}

/// [`PointsToStore`] formatted with value names, e.g. `p -> {a, b}; q -> {}`
pub struct StoreDisplay<'a> {
    store: &'a PointsToStore,
    program: &'a Program,
}

impl fmt::Display for StoreDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (loc, set)) in self.store.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            let names: Vec<&str> = set.iter().map(|v| self.program.value_name(*v)).collect();
            write!(f, "{} -> {{{}}}", self.program.value_name(loc), names.join(", "))?;
        }
        Ok(())
    }
}
