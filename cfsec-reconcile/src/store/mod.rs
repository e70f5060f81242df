//! RelationStore trait definitions.
//!
//! The store abstracts the Cloud Foundry API (and the security entitlement
//! broker) so the reconciler works with plain identifiers instead of HTTP
//! requests. One store instance serves one [`RelationKind`](crate::RelationKind).

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use memory::{MemoryStore, StoreCall, StoreSnapshot};

/// A security group as returned by the remote, with the GUIDs it is
/// associated with (running spaces or entitled organizations).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAssociation {
    pub security_group_guid: String,
    #[serde(default)]
    pub related_guids: Vec<String>,
}

impl RawAssociation {
    pub fn new(security_group_guid: impl Into<String>, related_guids: Vec<String>) -> Self {
        Self {
            security_group_guid: security_group_guid.into(),
            related_guids,
        }
    }
}

/// Restricts which security groups `list_observed` returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    security_groups: Option<BTreeSet<String>>,
}

impl ScopeFilter {
    /// Every security group visible to the caller.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only the given security groups.
    pub fn security_groups<I, S>(guids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            security_groups: Some(guids.into_iter().map(Into::into).collect()),
        }
    }

    pub fn matches(&self, security_group_guid: &str) -> bool {
        match &self.security_groups {
            Some(guids) => guids.contains(security_group_guid),
            None => true,
        }
    }
}

/// Remote capability the reconciler mutates and observes.
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Create the association. Fails with `AlreadyBound` or `Remote`.
    async fn bind(&self, left: &str, right: &str) -> Result<(), StoreError>;

    /// Remove the association. Absence must be reported as `NotFound`.
    async fn unbind(&self, left: &str, right: &str) -> Result<(), StoreError>;

    /// Current remote associations, unprojected.
    async fn list_observed(&self, filter: &ScopeFilter) -> Result<Vec<RawAssociation>, StoreError>;

    /// Whether the authenticated principal is an administrator.
    async fn has_elevated_privilege(&self) -> bool;
}

#[async_trait]
impl<S: RelationStore + ?Sized> RelationStore for std::sync::Arc<S> {
    async fn bind(&self, left: &str, right: &str) -> Result<(), StoreError> {
        (**self).bind(left, right).await
    }

    async fn unbind(&self, left: &str, right: &str) -> Result<(), StoreError> {
        (**self).unbind(left, right).await
    }

    async fn list_observed(&self, filter: &ScopeFilter) -> Result<Vec<RawAssociation>, StoreError> {
        (**self).list_observed(filter).await
    }

    async fn has_elevated_privilege(&self) -> bool {
        (**self).has_elevated_privilege().await
    }
}
