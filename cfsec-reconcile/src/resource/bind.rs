//! `bind_asg` resource: security groups bound to spaces.

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

/// One `bind` block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaceBinding {
    pub asg_id: String,
    pub space_id: String,
}

impl SpaceBinding {
    pub fn new(asg_id: impl Into<String>, space_id: impl Into<String>) -> Self {
        Self {
            asg_id: asg_id.into(),
            space_id: space_id.into(),
        }
    }
}

/// Declarative spec of the `bind_asg` resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindAsgSpec {
    #[serde(default)]
    pub bind: Vec<SpaceBinding>,
    /// Adopt every binding visible to an admin instead of the declared ones.
    ///
    /// Surprising on purpose: with admin privilege this replaces the declared
    /// bindings with whatever the platform currently has, so bindings declared
    /// here but missing remotely are dropped rather than re-created. Without
    /// admin privilege the flag has no effect.
    #[serde(default)]
    pub force: bool,
}

impl BindAsgSpec {
    /// Declared bindings as a validated relation set.
    pub fn desired(&self) -> Result<RelationSet> {
        RelationSet::from_pairs(
            self.bind
                .iter()
                .map(|b| (b.asg_id.as_str(), b.space_id.as_str())),
        )
    }

    fn with_relations(&self, relations: &RelationSet) -> Self {
        Self {
            bind: relations
                .iter()
                .map(|r| SpaceBinding::new(r.left(), r.right()))
                .collect(),
            force: self.force,
        }
    }
}

/// The `bind_asg` resource.
pub struct BindAsg<S> {
    reconciler: RelationReconciler<S>,
}

impl<S: RelationStore> BindAsg<S> {
    pub fn new(store: S) -> Self {
        Self {
            reconciler: RelationReconciler::new(store, RelationKind::SpaceBinding),
        }
    }

    pub fn reconciler(&self) -> &RelationReconciler<S> {
        &self.reconciler
    }

    /// Bind every declared pair and return the new resource id.
    ///
    /// Pairs that are already bound remotely are left as they are.
    /// `force` is not honoured here, only on later reads and updates.
    pub async fn create(
        &self,
        spec: &BindAsgSpec,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let declared = spec.desired()?;
        let outcome = self
            .reconciler
            .reconcile(&declared, &Ownership::Tracked(RelationSet::new()), false, cancel)
            .await?;
        let id = new_resource_id();
        info!(
            "Created bind_asg {} ({} bindings, {} new)",
            id,
            declared.len(),
            outcome.report.added
        );
        Ok(id)
    }

    /// Refresh the spec from remote state.
    pub async fn read(&self, spec: &BindAsgSpec) -> Result<BindAsgSpec> {
        let declared = spec.desired()?;
        let refreshed = self.reconciler.refresh(&declared, spec.force).await?;
        Ok(spec.with_relations(&refreshed.relations))
    }

    /// Mutations `create` would issue, without issuing them.
    pub async fn plan_create(&self, spec: &BindAsgSpec) -> Result<Diff> {
        let plan = self
            .reconciler
            .plan(&spec.desired()?, &Ownership::Tracked(RelationSet::new()), false)
            .await?;
        Ok(plan.diff)
    }

    /// Mutations `reconcile` would issue, without issuing them.
    pub async fn plan(&self, prior: &BindAsgSpec, spec: &BindAsgSpec) -> Result<Diff> {
        let plan = self
            .reconciler
            .plan(
                &spec.desired()?,
                &Ownership::Tracked(prior.desired()?),
                spec.force,
            )
            .await?;
        Ok(plan.diff)
    }
}

#[async_trait]
impl<S: RelationStore> Reconciler for BindAsg<S> {
    type Spec = BindAsgSpec;
    type Status = ResourceStatus;

    async fn reconcile(
        &self,
        id: &str,
        prior: &Self::Spec,
        spec: &Self::Spec,
        cancel: &CancellationToken,
    ) -> Result<Self::Status> {
        info!("Reconciling bind_asg {}", id);
        let outcome = self
            .reconciler
            .reconcile(
                &spec.desired()?,
                &Ownership::Tracked(prior.desired()?),
                spec.force,
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
        info!("Finalizing (unbinding) bind_asg {}", id);
        self.reconciler.remove_all(&spec.desired()?, cancel).await?;
        Ok(())
    }
}
