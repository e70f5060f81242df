//! Relation reconciler.
//!
//! Compares a declared relation set with what the store reports and applies
//! the minimal set of mutations to converge. One pass is:
//!
//! 1. observe (fresh read, never cached)
//! 2. resolve the desired set (declared, or everything observed in adopt-all mode)
//! 3. diff
//! 4. apply: all removals, then all additions
//! 5. observe again and report whether the store converged
//!
//! Callers must not run two passes concurrently against the same store and
//! relation set.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::diff::{Diff, diff};
use crate::error::{ReconcileError, Result, StoreError};
use crate::project::project;
use crate::relation::{Operation, Relation, RelationKind, RelationSet};
use crate::store::{RelationStore, ScopeFilter};

/// Proof that the store confirmed elevated (admin) privilege.
///
/// Only obtainable through [`ElevatedPrivilege::confirm`].
#[derive(Debug)]
pub struct ElevatedPrivilege {
    _private: (),
}

impl ElevatedPrivilege {
    /// Ask the store whether the principal is an administrator.
    pub async fn confirm<S: RelationStore + ?Sized>(store: &S) -> Option<Self> {
        if store.has_elevated_privilege().await {
            Some(Self { _private: () })
        } else {
            None
        }
    }
}

/// Treat everything observed as desired.
///
/// This overwrites the declared set with remote state: relations added out of
/// band are adopted, and declared relations missing remotely are dropped
/// instead of re-created. No mutations follow from an adopted set.
pub fn adopt_all(observed: &RelationSet, _privilege: &ElevatedPrivilege) -> RelationSet {
    observed.clone()
}

/// Which observed relations a pass is allowed to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Every observed relation in scope is managed by the caller.
    Exclusive,
    /// Only relations the caller tracked previously (plus the declared ones)
    /// are managed. Anything else observed is left alone.
    Tracked(RelationSet),
}

impl Ownership {
    /// The part of `observed` this pass manages.
    pub fn managed(&self, observed: &RelationSet, desired: &RelationSet) -> RelationSet {
        match self {
            Ownership::Exclusive => observed.clone(),
            Ownership::Tracked(previous) => observed
                .iter()
                .filter(|r| previous.contains(r) || desired.contains(r))
                .cloned()
                .collect(),
        }
    }
}

/// Desired set for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Desired {
    pub relations: RelationSet,
    /// `true` when the observed set was adopted.
    pub adopted: bool,
}

/// Desired set and the mutations that would reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub desired: Desired,
    pub diff: Diff,
}

/// Counts of what an apply actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub added: usize,
    pub removed: usize,
    /// Removals that found the relation already gone.
    pub already_absent: usize,
}

/// Result of a full reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub desired: Desired,
    pub diff: Diff,
    pub report: ApplyReport,
    /// Whether the re-read matched the desired set.
    pub converged: bool,
}

/// Reconciler for one relation kind backed by one store.
pub struct RelationReconciler<S> {
    store: S,
    kind: RelationKind,
    scope: ScopeFilter,
}

impl<S: RelationStore> RelationReconciler<S> {
    pub fn new(store: S, kind: RelationKind) -> Self {
        Self {
            store,
            kind,
            scope: ScopeFilter::all(),
        }
    }

    /// Restrict observation to a subset of security groups.
    pub fn with_scope(mut self, scope: ScopeFilter) -> Self {
        self.scope = scope;
        self
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read and project the current remote state.
    pub async fn observe(&self) -> Result<RelationSet> {
        let raw = self
            .store
            .list_observed(&self.scope)
            .await
            .map_err(ReconcileError::Observe)?;
        let observed = project(&raw);
        debug!(
            kind = %self.kind,
            groups = raw.len(),
            relations = observed.len(),
            "Observed remote state"
        );
        Ok(observed)
    }

    /// Pick the desired set for a pass.
    ///
    /// With `adopt_all` set and privilege confirmed by the store, the observed
    /// set is adopted verbatim. Without privilege the flag is ignored and the
    /// declared set is used.
    pub async fn resolve_desired(
        &self,
        declared: &RelationSet,
        observed: &RelationSet,
        adopt_all_requested: bool,
    ) -> Desired {
        if adopt_all_requested {
            if let Some(privilege) = ElevatedPrivilege::confirm(&self.store).await {
                info!(
                    kind = %self.kind,
                    relations = observed.len(),
                    "Adopting all observed relations"
                );
                return Desired {
                    relations: adopt_all(observed, &privilege),
                    adopted: true,
                };
            }
            debug!(
                kind = %self.kind,
                "Adopt-all requested without admin privilege, diffing declared state"
            );
        }
        Desired {
            relations: declared.clone(),
            adopted: false,
        }
    }

    /// Apply a diff: every removal first, then every addition.
    ///
    /// A removal whose target is already gone counts as done. Any other
    /// failure stops the pass and is returned with the operation and relation;
    /// mutations that already succeeded are not rolled back.
    pub async fn apply(&self, diff: &Diff, cancel: &CancellationToken) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();

        let remove_op = self.kind.remove_op();
        for relation in &diff.to_remove {
            match self.call(remove_op, relation, cancel).await? {
                Ok(()) => {
                    info!(target: "audit", kind = %self.kind, "{} {}", remove_op, relation);
                    report.removed += 1;
                }
                Err(StoreError::NotFound { .. }) => {
                    debug!(kind = %self.kind, "{} {}: already absent", remove_op, relation);
                    report.already_absent += 1;
                }
                Err(source) => {
                    warn!(kind = %self.kind, "{} {} failed: {}", remove_op, relation, source);
                    return Err(ReconcileError::Store {
                        op: remove_op,
                        relation: relation.clone(),
                        source,
                    });
                }
            }
        }

        let add_op = self.kind.add_op();
        for relation in &diff.to_add {
            match self.call(add_op, relation, cancel).await? {
                Ok(()) => {
                    info!(target: "audit", kind = %self.kind, "{} {}", add_op, relation);
                    report.added += 1;
                }
                Err(source) => {
                    warn!(kind = %self.kind, "{} {} failed: {}", add_op, relation, source);
                    return Err(ReconcileError::Store {
                        op: add_op,
                        relation: relation.clone(),
                        source,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Remove every relation in `relations`, tolerating ones already gone.
    pub async fn remove_all(
        &self,
        relations: &RelationSet,
        cancel: &CancellationToken,
    ) -> Result<ApplyReport> {
        let diff = Diff {
            to_add: Vec::new(),
            to_remove: relations.iter().cloned().collect(),
        };
        self.apply(&diff, cancel).await
    }

    /// Compute what a pass would do without mutating anything.
    pub async fn plan(
        &self,
        declared: &RelationSet,
        ownership: &Ownership,
        adopt_all_requested: bool,
    ) -> Result<Plan> {
        let observed = self.observe().await?;
        let desired = self
            .resolve_desired(declared, &observed, adopt_all_requested)
            .await;

        // adopting bypasses diffing entirely
        let diff = if desired.adopted {
            Diff::default()
        } else {
            diff(&desired.relations, &ownership.managed(&observed, &desired.relations))
        };
        Ok(Plan { desired, diff })
    }

    /// Refresh a declared set from remote state.
    ///
    /// Declared relations that no longer exist remotely are dropped, so the
    /// next pass re-creates them. In adopt-all mode with privilege, every
    /// observed relation is returned.
    pub async fn refresh(
        &self,
        declared: &RelationSet,
        adopt_all_requested: bool,
    ) -> Result<Desired> {
        let observed = self.observe().await?;
        let desired = self
            .resolve_desired(declared, &observed, adopt_all_requested)
            .await;
        if desired.adopted {
            return Ok(desired);
        }
        Ok(Desired {
            relations: declared.intersection(&observed),
            adopted: false,
        })
    }

    /// Run a full pass: observe, resolve, diff, apply, re-observe.
    pub async fn reconcile(
        &self,
        declared: &RelationSet,
        ownership: &Ownership,
        adopt_all_requested: bool,
        cancel: &CancellationToken,
    ) -> Result<PassOutcome> {
        let Plan { desired, diff } = self.plan(declared, ownership, adopt_all_requested).await?;

        info!(
            kind = %self.kind,
            add = diff.to_add.len(),
            remove = diff.to_remove.len(),
            adopted = desired.adopted,
            "Reconciling"
        );

        let report = self.apply(&diff, cancel).await?;

        let after = self.observe().await?;
        let converged = after_converged(&desired.relations, &after, ownership);
        if !converged {
            warn!(kind = %self.kind, "Remote state did not converge after apply");
        }

        Ok(PassOutcome {
            desired,
            diff,
            report,
            converged,
        })
    }

    /// Issue one store call. The outer error is cancellation only.
    async fn call(
        &self,
        op: Operation,
        relation: &Relation,
        cancel: &CancellationToken,
    ) -> Result<std::result::Result<(), StoreError>> {
        let cancelled = || ReconcileError::Cancelled {
            op,
            relation: relation.clone(),
        };
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let (left, right) = (relation.left(), relation.right());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled()),
            result = async {
                if op.is_removal() {
                    self.store.unbind(left, right).await
                } else {
                    self.store.bind(left, right).await
                }
            } => Ok(result),
        }
    }
}

fn after_converged(desired: &RelationSet, after: &RelationSet, ownership: &Ownership) -> bool {
    diff(desired, &ownership.managed(after, desired)).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, RawAssociation, StoreSnapshot};

    fn set(pairs: &[(&str, &str)]) -> RelationSet {
        RelationSet::from_pairs(pairs.iter().copied()).unwrap()
    }

    fn store(admin: bool, groups: &[(&str, &[&str])]) -> MemoryStore {
        MemoryStore::from_snapshot(StoreSnapshot {
            admin,
            security_groups: groups
                .iter()
                .map(|(g, related)| {
                    RawAssociation::new(*g, related.iter().map(|s| s.to_string()).collect())
                })
                .collect(),
        })
    }

    #[tokio::test]
    async fn test_privilege_confirmation() {
        assert!(ElevatedPrivilege::confirm(&store(true, &[])).await.is_some());
        assert!(ElevatedPrivilege::confirm(&store(false, &[])).await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_desired_adopts_with_privilege() {
        let reconciler =
            RelationReconciler::new(store(true, &[("g1", &["s1"])]), RelationKind::SpaceBinding);
        let observed = reconciler.observe().await.unwrap();

        let desired = reconciler
            .resolve_desired(&RelationSet::new(), &observed, true)
            .await;
        assert!(desired.adopted);
        assert_eq!(desired.relations, set(&[("g1", "s1")]));
        assert!(diff(&desired.relations, &desired.relations).is_empty());
    }

    #[tokio::test]
    async fn test_resolve_desired_degrades_without_privilege() {
        let reconciler =
            RelationReconciler::new(store(false, &[("g1", &["s1"])]), RelationKind::SpaceBinding);
        let observed = reconciler.observe().await.unwrap();
        let declared = set(&[("g1", "s2")]);

        let desired = reconciler.resolve_desired(&declared, &observed, true).await;
        assert!(!desired.adopted);
        assert_eq!(desired.relations, declared);
    }

    #[test]
    fn test_tracked_ownership_ignores_foreign_relations() {
        let observed = set(&[("g1", "s1"), ("g1", "s2"), ("g9", "s9")]);
        let ownership = Ownership::Tracked(set(&[("g1", "s1")]));
        let desired = set(&[("g1", "s2")]);

        assert_eq!(
            ownership.managed(&observed, &desired),
            set(&[("g1", "s1"), ("g1", "s2")])
        );
        assert_eq!(Ownership::Exclusive.managed(&observed, &desired), observed);
    }

    #[tokio::test]
    async fn test_observe_failure_is_wrapped() {
        let s = store(false, &[]);
        s.inject_list_failure(StoreError::Remote("timeout".into())).await;
        let reconciler = RelationReconciler::new(s, RelationKind::OrgEntitlement);

        let err = reconciler.observe().await.unwrap_err();
        assert!(matches!(err, ReconcileError::Observe(StoreError::Remote(_))));
    }

    #[tokio::test]
    async fn test_scope_limits_observation() {
        let reconciler = RelationReconciler::new(
            store(false, &[("g1", &["s1"]), ("g2", &["s2"])]),
            RelationKind::SpaceBinding,
        )
        .with_scope(ScopeFilter::security_groups(["g2"]));

        assert_eq!(reconciler.observe().await.unwrap(), set(&[("g2", "s2")]));
    }
}
