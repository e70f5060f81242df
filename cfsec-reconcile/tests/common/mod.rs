//! Test helpers for cfsec-reconcile integration tests.

#![allow(dead_code)]

use cfsec_reconcile::{MemoryStore, RawAssociation, Relation, RelationSet, StoreSnapshot};

/// Relation set from `(left, right)` pairs.
pub fn set(pairs: &[(&str, &str)]) -> RelationSet {
    RelationSet::from_pairs(pairs.iter().copied()).expect("valid test pairs")
}

pub fn rel(left: &str, right: &str) -> Relation {
    Relation::new(left, right).expect("valid test pair")
}

/// Memory store seeded with security groups and their related GUIDs.
pub fn store(admin: bool, groups: &[(&str, &[&str])]) -> MemoryStore {
    MemoryStore::from_snapshot(StoreSnapshot {
        admin,
        security_groups: groups
            .iter()
            .map(|(guid, related)| {
                RawAssociation::new(*guid, related.iter().map(|s| s.to_string()).collect())
            })
            .collect(),
    })
}
