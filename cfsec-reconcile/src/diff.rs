//! Diff between a desired and an observed relation set.
//!
//! This is a pure function: no store access, no logging, deterministic for a
//! given pair of inputs.

use crate::relation::{Relation, RelationSet};

/// Mutations needed to turn `observed` into `desired`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub to_add: Vec<Relation>,
    pub to_remove: Vec<Relation>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Number of store calls applying this diff issues.
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }

    /// `observed` with this diff applied.
    pub fn apply_to(&self, observed: &RelationSet) -> RelationSet {
        let mut next = observed.clone();
        for relation in &self.to_remove {
            next.remove(relation);
        }
        next.extend(self.to_add.iter().cloned());
        next
    }
}

/// Compute the additions and removals that converge `observed` to `desired`.
///
/// * `to_remove` holds relations observed but not desired.
/// * `to_add` holds relations desired but not observed.
///
/// Matching is exact pair equality.
pub fn diff(desired: &RelationSet, observed: &RelationSet) -> Diff {
    Diff {
        to_add: desired.difference(observed).cloned().collect(),
        to_remove: observed.difference(desired).cloned().collect(),
    }
}
