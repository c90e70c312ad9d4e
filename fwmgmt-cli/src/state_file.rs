//! Local state file for a tracked membership resource.

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use fwmgmt_groups::{MembershipState, ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};

/// What the CLI remembers between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedResource {
    pub kind: ResourceKind,
    /// Composite identifier in wire form.
    pub id: String,
    pub state: MembershipState,
}

impl TrackedResource {
    pub fn new(kind: ResourceKind, id: &ResourceId, state: MembershipState) -> Self {
        Self {
            kind,
            id: id.to_string(),
            state,
        }
    }

    pub fn resource_id(&self) -> Result<ResourceId> {
        ResourceId::parse(&self.id, self.kind).context("State file holds an invalid identifier")
    }
}

/// Load the tracked resource, or `None` if nothing is tracked yet.
pub async fn load(path: &Path) -> Result<Option<TrackedResource>> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    let tracked = serde_json::from_slice(&data)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(tracked))
}

pub async fn save(path: &Path, tracked: &TrackedResource) -> Result<()> {
    let data = serde_json::to_vec_pretty(tracked)?;
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Forget the tracked resource.
pub async fn clear(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
