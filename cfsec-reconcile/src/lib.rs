//! cfsec-reconcile: converge security group bindings and entitlements.
//!
//! Diffs a declared set of (security group, space) or (security group,
//! organization) relations against what Cloud Foundry reports, then issues the
//! minimal bind/unbind or entitle/revoke calls through a [`RelationStore`].

pub mod diff;
pub mod error;
pub mod project;
pub mod reconciler;
pub mod relation;
pub mod resource;
pub mod store;

pub use diff::{Diff, diff};
pub use error::{ReconcileError, Result, StoreError};
pub use project::project;
pub use reconciler::{
    ApplyReport, Desired, ElevatedPrivilege, Ownership, PassOutcome, Plan, RelationReconciler,
    adopt_all,
};
pub use relation::{Operation, Relation, RelationKind, RelationSet};
pub use resource::{
    BindAsg, BindAsgSpec, EntitleAsg, EntitleAsgSpec, OrgEntitlement, Reconciler, ResourceStatus,
    SpaceBinding,
};
pub use store::{
    MemoryStore, RawAssociation, RelationStore, ScopeFilter, StoreCall, StoreSnapshot,
};
pub use tokio_util::sync::CancellationToken;
