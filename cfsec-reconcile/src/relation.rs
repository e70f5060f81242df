//! Relation model: a security group paired with a space or an organization.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};

/// Which association a relation stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Security group bound to a space (running set).
    SpaceBinding,
    /// Organization entitled to use a security group.
    OrgEntitlement,
}

impl RelationKind {
    /// Field name of the right-hand identifier in declarative blocks.
    pub fn right_field(self) -> &'static str {
        match self {
            RelationKind::SpaceBinding => "space_id",
            RelationKind::OrgEntitlement => "org_id",
        }
    }

    pub fn add_op(self) -> Operation {
        match self {
            RelationKind::SpaceBinding => Operation::Bind,
            RelationKind::OrgEntitlement => Operation::Entitle,
        }
    }

    pub fn remove_op(self) -> Operation {
        match self {
            RelationKind::SpaceBinding => Operation::Unbind,
            RelationKind::OrgEntitlement => Operation::Revoke,
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::SpaceBinding => write!(f, "space binding"),
            RelationKind::OrgEntitlement => write!(f, "org entitlement"),
        }
    }
}

/// A single store mutation, named the way operators know it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Bind,
    Unbind,
    Entitle,
    Revoke,
}

impl Operation {
    pub fn is_removal(self) -> bool {
        matches!(self, Operation::Unbind | Operation::Revoke)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Operation::Bind => "bind",
            Operation::Unbind => "unbind",
            Operation::Entitle => "entitle",
            Operation::Revoke => "revoke",
        };
        f.write_str(verb)
    }
}

/// Ordered pair `(left, right)`; the pair is the identity.
///
/// `left` is always the security group GUID, `right` the space or organization
/// GUID. Both sides are non-empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "(String, String)", into = "(String, String)")]
pub struct Relation {
    left: String,
    right: String,
}

impl Relation {
    /// Create a relation, rejecting empty identifiers.
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Result<Self> {
        let left = left.into();
        let right = right.into();
        if left.is_empty() {
            return Err(ReconcileError::Validation(format!(
                "relation ({left:?}, {right:?}) has an empty security group id"
            )));
        }
        if right.is_empty() {
            return Err(ReconcileError::Validation(format!(
                "relation ({left:?}, {right:?}) has an empty target id"
            )));
        }
        Ok(Self { left, right })
    }

    pub fn left(&self) -> &str {
        &self.left
    }

    pub fn right(&self) -> &str {
        &self.right
    }
}

impl TryFrom<(String, String)> for Relation {
    type Error = ReconcileError;

    fn try_from((left, right): (String, String)) -> Result<Self> {
        Relation::new(left, right)
    }
}

impl From<Relation> for (String, String) {
    fn from(relation: Relation) -> Self {
        (relation.left, relation.right)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.left, self.right)
    }
}

/// Deduplicated set of relations.
///
/// Backed by a `BTreeSet` so iteration is stable, which keeps logs and
/// operation order reproducible. Nothing downstream depends on that order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationSet {
    inner: BTreeSet<Relation>,
}

impl RelationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from raw `(left, right)` pairs, validating each one.
    pub fn from_pairs<I, L, R>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        pairs
            .into_iter()
            .map(|(l, r)| Relation::new(l, r))
            .collect()
    }

    /// Returns `true` if the relation was not already present.
    pub fn insert(&mut self, relation: Relation) -> bool {
        self.inner.insert(relation)
    }

    pub fn remove(&mut self, relation: &Relation) -> bool {
        self.inner.remove(relation)
    }

    pub fn contains(&self, relation: &Relation) -> bool {
        self.inner.contains(relation)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relation> {
        self.inner.iter()
    }

    /// Relations in `self` that are absent from `other`.
    pub fn difference<'a>(&'a self, other: &'a RelationSet) -> impl Iterator<Item = &'a Relation> {
        self.inner.difference(&other.inner)
    }

    /// Relations present in both sets.
    pub fn intersection(&self, other: &RelationSet) -> RelationSet {
        self.inner.intersection(&other.inner).cloned().collect()
    }
}

impl FromIterator<Relation> for RelationSet {
    fn from_iter<T: IntoIterator<Item = Relation>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl Extend<Relation> for RelationSet {
    fn extend<T: IntoIterator<Item = Relation>>(&mut self, iter: T) {
        self.inner.extend(iter);
    }
}

impl IntoIterator for RelationSet {
    type Item = Relation;
    type IntoIter = std::collections::btree_set::IntoIter<Relation>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<'a> IntoIterator for &'a RelationSet {
    type Item = &'a Relation;
    type IntoIter = std::collections::btree_set::Iter<'a, Relation>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}
