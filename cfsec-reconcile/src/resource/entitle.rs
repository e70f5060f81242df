//! `entitle_asg` resource: organizations entitled to security groups.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{Reconciler, ResourceStatus, new_resource_id};
use crate::diff::Diff;
use crate::error::Result;
use crate::reconciler::{Ownership, RelationReconciler};
use crate::relation::{RelationKind, RelationSet};
use crate::store::RelationStore;

/// One `entitle` block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgEntitlement {
    pub asg_id: String,
    pub org_id: String,
}

impl OrgEntitlement {
    pub fn new(asg_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            asg_id: asg_id.into(),
            org_id: org_id.into(),
        }
    }
}

/// Declarative spec of the `entitle_asg` resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitleAsgSpec {
    #[serde(default)]
    pub entitle: Vec<OrgEntitlement>,
}

impl EntitleAsgSpec {
    pub fn desired(&self) -> Result<RelationSet> {
        RelationSet::from_pairs(
            self.entitle
                .iter()
                .map(|e| (e.asg_id.as_str(), e.org_id.as_str())),
        )
    }

    fn from_relations(relations: &RelationSet) -> Self {
        Self {
            entitle: relations
                .iter()
                .map(|r| OrgEntitlement::new(r.left(), r.right()))
                .collect(),
        }
    }
}

/// The `entitle_asg` resource.
pub struct EntitleAsg<S> {
    reconciler: RelationReconciler<S>,
}

impl<S: RelationStore> EntitleAsg<S> {
    pub fn new(store: S) -> Self {
        Self {
            reconciler: RelationReconciler::new(store, RelationKind::OrgEntitlement),
        }
    }

    pub fn reconciler(&self) -> &RelationReconciler<S> {
        &self.reconciler
    }

    pub async fn create(
        &self,
        spec: &EntitleAsgSpec,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let declared = spec.desired()?;
        self.reconciler
            .reconcile(&declared, &Ownership::Tracked(RelationSet::new()), false, cancel)
            .await?;
        let id = new_resource_id();
        info!("Created entitle_asg {} ({} entitlements)", id, declared.len());
        Ok(id)
    }

    pub async fn read(&self, spec: &EntitleAsgSpec) -> Result<EntitleAsgSpec> {
        let refreshed = self.reconciler.refresh(&spec.desired()?, false).await?;
        Ok(EntitleAsgSpec::from_relations(&refreshed.relations))
    }

    pub async fn plan_create(&self, spec: &EntitleAsgSpec) -> Result<Diff> {
        let plan = self
            .reconciler
            .plan(&spec.desired()?, &Ownership::Tracked(RelationSet::new()), false)
            .await?;
        Ok(plan.diff)
    }

    pub async fn plan(&self, prior: &EntitleAsgSpec, spec: &EntitleAsgSpec) -> Result<Diff> {
        let plan = self
            .reconciler
            .plan(&spec.desired()?, &Ownership::Tracked(prior.desired()?), false)
            .await?;
        Ok(plan.diff)
    }
}

#[async_trait]
impl<S: RelationStore> Reconciler for EntitleAsg<S> {
    type Spec = EntitleAsgSpec;
    type Status = ResourceStatus;

    async fn reconcile(
        &self,
        id: &str,
        prior: &Self::Spec,
        spec: &Self::Spec,
        cancel: &CancellationToken,
    ) -> Result<Self::Status> {
        info!("Reconciling entitle_asg {}", id);
        let outcome = self
            .reconciler
            .reconcile(
                &spec.desired()?,
                &Ownership::Tracked(prior.desired()?),
                false,
                cancel,
            )
            .await?;
        Ok(ResourceStatus::from_outcome(id, &outcome))
    }

    async fn finalize(
        &self,
        id: &str,
        spec: &Self::Spec,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("Finalizing (revoking) entitle_asg {}", id);
        self.reconciler.remove_all(&spec.desired()?, cancel).await?;
        Ok(())
    }
}
