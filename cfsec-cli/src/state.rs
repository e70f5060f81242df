//! Manifest and state file handling.
//!
//! The manifest declares `bind`, `force` and `entitle` blocks. The state file
//! holds a snapshot of remote associations (`spaces`, `organizations`) plus the
//! ids and last applied specs of the two resources.

use std::path::Path;

use anyhow::{Context, Result};
use cfsec_reconcile::{BindAsgSpec, EntitleAsgSpec, StoreSnapshot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Declared resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(flatten)]
    pub bind_asg: BindAsgSpec,
    #[serde(flatten)]
    pub entitle_asg: EntitleAsgSpec,
}

/// A resource that has been created, with the spec it was last applied with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recorded<T> {
    pub id: String,
    pub spec: T,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_asg: Option<Recorded<BindAsgSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitle_asg: Option<Recorded<EntitleAsgSpec>>,
}

/// Contents of the state file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub spaces: StoreSnapshot,
    #[serde(default)]
    pub organizations: StoreSnapshot,
    #[serde(default)]
    pub resources: Resources,
}

async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

pub async fn load_manifest(path: &Path) -> Result<Manifest> {
    load_json(path).await
}

/// Load the state file; a missing file is an empty state.
pub async fn load_state(path: &Path) -> Result<StateFile> {
    if !tokio::fs::try_exists(path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?
    {
        return Ok(StateFile::default());
    }
    load_json(path).await
}

pub async fn save_state(path: &Path, state: &StateFile) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
