//! In-memory relation store.
//!
//! Holds security groups and their associations in a map. Used by the CLI
//! (persisted as a JSON snapshot) and by tests, which can inject failures,
//! add latency and inspect the calls that were made.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{RawAssociation, RelationStore, ScopeFilter};
use crate::error::StoreError;

/// Serializable view of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Whether the principal is an administrator.
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub security_groups: Vec<RawAssociation>,
}

/// A mutation recorded by the store, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Bind(String, String),
    Unbind(String, String),
}

#[derive(Default)]
struct Inner {
    groups: BTreeMap<String, BTreeSet<String>>,
    failures: HashMap<(String, String), StoreError>,
    list_failure: Option<StoreError>,
    calls: Vec<StoreCall>,
}

/// In-memory [`RelationStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    admin: bool,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for sg in snapshot.security_groups {
            groups
                .entry(sg.security_group_guid)
                .or_default()
                .extend(sg.related_guids);
        }
        Self {
            inner: Mutex::new(Inner {
                groups,
                ..Default::default()
            }),
            admin: snapshot.admin,
            latency: None,
        }
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    /// Delay every bind/unbind by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register a security group with no associations.
    pub async fn add_security_group(&self, guid: &str) {
        self.inner
            .lock()
            .await
            .groups
            .entry(guid.to_string())
            .or_default();
    }

    /// Make every bind/unbind of `(left, right)` fail with `error`.
    pub async fn inject_failure(&self, left: &str, right: &str, error: StoreError) {
        self.inner
            .lock()
            .await
            .failures
            .insert((left.to_string(), right.to_string()), error);
    }

    /// Make `list_observed` fail with `error`.
    pub async fn inject_list_failure(&self, error: StoreError) {
        self.inner.lock().await.list_failure = Some(error);
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn contains(&self, left: &str, right: &str) -> bool {
        self.inner
            .lock()
            .await
            .groups
            .get(left)
            .is_some_and(|related| related.contains(right))
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.lock().await;
        StoreSnapshot {
            admin: self.admin,
            security_groups: inner
                .groups
                .iter()
                .map(|(guid, related)| {
                    RawAssociation::new(guid.clone(), related.iter().cloned().collect())
                })
                .collect(),
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RelationStore for MemoryStore {
    async fn bind(&self, left: &str, right: &str) -> Result<(), StoreError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().await;
        inner
            .calls
            .push(StoreCall::Bind(left.to_string(), right.to_string()));

        if let Some(err) = inner.failures.get(&(left.to_string(), right.to_string())) {
            return Err(err.clone());
        }

        let Some(related) = inner.groups.get_mut(left) else {
            return Err(StoreError::Remote(format!(
                "security group {left} does not exist"
            )));
        };
        if !related.insert(right.to_string()) {
            return Err(StoreError::already_bound(left, right));
        }
        debug!(security_group = %left, target = %right, "bound");
        Ok(())
    }

    async fn unbind(&self, left: &str, right: &str) -> Result<(), StoreError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().await;
        inner
            .calls
            .push(StoreCall::Unbind(left.to_string(), right.to_string()));

        if let Some(err) = inner.failures.get(&(left.to_string(), right.to_string())) {
            return Err(err.clone());
        }

        let removed = inner
            .groups
            .get_mut(left)
            .is_some_and(|related| related.remove(right));
        if !removed {
            return Err(StoreError::not_found(left, right));
        }
        debug!(security_group = %left, target = %right, "unbound");
        Ok(())
    }

    async fn list_observed(&self, filter: &ScopeFilter) -> Result<Vec<RawAssociation>, StoreError> {
        let inner = self.inner.lock().await;
        if let Some(err) = &inner.list_failure {
            return Err(err.clone());
        }
        Ok(inner
            .groups
            .iter()
            .filter(|(guid, _)| filter.matches(guid))
            .map(|(guid, related)| {
                RawAssociation::new(guid.clone(), related.iter().cloned().collect())
            })
            .collect())
    }

    async fn has_elevated_privilege(&self) -> bool {
        self.admin
    }
}
