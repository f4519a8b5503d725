//! Provider view - read-only access to security groups held by an external
//! cloud provider.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SecGroupError};

/// A security group as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSecurityGroup {
    /// Provider-assigned identity, stable across listings.
    pub global_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl RemoteSecurityGroup {
    pub fn new(global_id: &str, name: &str, description: Option<&str>) -> Self {
        Self {
            global_id: global_id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
        }
    }
}

/// Account a listing is performed with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub account: String,
    pub region: Option<String>,
}

impl ProviderCredentials {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: None,
        }
    }
}

/// Trait for listing a provider's security groups.
///
/// Implementations must return one consistent snapshot per call.
#[async_trait]
pub trait SecurityGroupProvider: Send + Sync {
    async fn list_security_groups(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<Vec<RemoteSecurityGroup>>;
}

/// In-memory provider returning whatever snapshot was last set.
#[derive(Debug, Default)]
pub struct StaticProvider {
    groups: RwLock<Vec<RemoteSecurityGroup>>,
}

impl StaticProvider {
    pub fn new(groups: Vec<RemoteSecurityGroup>) -> Self {
        Self {
            groups: RwLock::new(groups),
        }
    }

    /// Replace the snapshot returned by subsequent listings.
    pub fn set(&self, groups: Vec<RemoteSecurityGroup>) {
        match self.groups.write() {
            Ok(mut g) => *g = groups,
            Err(poisoned) => *poisoned.into_inner() = groups,
        }
    }
}

#[async_trait]
impl SecurityGroupProvider for StaticProvider {
    async fn list_security_groups(
        &self,
        _credentials: &ProviderCredentials,
    ) -> Result<Vec<RemoteSecurityGroup>> {
        self.groups
            .read()
            .map(|g| g.clone())
            .map_err(|_| SecGroupError::Provider("snapshot lock poisoned".to_string()))
    }
}

/// Provider backed by a JSON file holding an array of remote groups.
///
/// The file is re-read on every listing so an exporter can replace it
/// between runs.
#[derive(Debug, Clone)]
pub struct JsonSnapshotProvider {
    path: PathBuf,
}

impl JsonSnapshotProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SecurityGroupProvider for JsonSnapshotProvider {
    async fn list_security_groups(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<Vec<RemoteSecurityGroup>> {
        let data = tokio::fs::read(&self.path).await.map_err(|e| {
            SecGroupError::Provider(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        let groups: Vec<RemoteSecurityGroup> = serde_json::from_slice(&data).map_err(|e| {
            SecGroupError::Provider(format!("invalid snapshot {}: {}", self.path.display(), e))
        })?;

        if let Some(bad) = groups.iter().find(|g| g.global_id.is_empty()) {
            return Err(SecGroupError::Provider(format!(
                "snapshot entry '{}' has no global_id",
                bad.name
            )));
        }

        debug!(
            account = %credentials.account,
            path = %self.path.display(),
            count = groups.len(),
            "Loaded provider snapshot"
        );
        Ok(groups)
    }
}
