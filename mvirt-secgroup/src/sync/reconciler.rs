//! Security group reconciler - converges the local store onto a provider
//! listing.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::compare::compare_sets;
use super::result::SyncResult;
use crate::error::{Result, SecGroupError};
use crate::model::{SecurityGroupData, SecurityGroupPatch};
use crate::provider::RemoteSecurityGroup;
use crate::store::GroupStore;

/// What a reconciliation run produced.
///
/// `local[i]` is the post-sync row for the provider resource `remote[i]`.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub local: Vec<SecurityGroupData>,
    pub remote: Vec<RemoteSecurityGroup>,
    pub result: SyncResult,
    /// Matched groups whose name or description changed in this run.
    pub changed: Vec<Uuid>,
}

/// Reconciles security groups against one provider listing.
///
/// Runs for the same scope must not overlap; the caller serializes them.
pub struct SecurityGroupReconciler<'a> {
    store: &'a dyn GroupStore,
    project_id: &'a str,
}

impl<'a> SecurityGroupReconciler<'a> {
    /// `project_id` owns the groups created for newly discovered resources.
    pub fn new(store: &'a dyn GroupStore, project_id: &'a str) -> Self {
        Self { store, project_id }
    }

    /// Snapshot this project's groups and reconcile them against `remote`.
    ///
    /// A provider identity already mapped to a group of another project is
    /// an `IdentityConflict`; nothing is written in that case.
    pub fn sync(&self, remote: &[RemoteSecurityGroup]) -> Result<SyncOutcome> {
        let (local, foreign): (Vec<_>, Vec<_>) = self
            .store
            .list_security_groups()?
            .into_iter()
            .partition(|sg| sg.project_id == self.project_id);

        let foreign_owners: HashMap<&str, &str> = foreign
            .iter()
            .filter_map(|sg| {
                sg.external_id
                    .as_deref()
                    .map(|ext| (ext, sg.project_id.as_str()))
            })
            .collect();

        if let Some((ext, owner)) = remote.iter().find_map(|r| {
            foreign_owners
                .get(r.global_id.as_str())
                .map(|owner| (r.global_id.as_str(), *owner))
        }) {
            return Err(SecGroupError::IdentityConflict {
                external_id: ext.to_string(),
                detail: format!("already synced into project {owner}"),
            });
        }

        self.reconcile(&local, remote)
    }

    /// Reconcile an explicit local snapshot against `remote`.
    ///
    /// Per-item store failures are counted in the result and the run goes
    /// on. Identity conflicts abort before anything is written.
    pub fn reconcile(
        &self,
        local: &[SecurityGroupData],
        remote: &[RemoteSecurityGroup],
    ) -> Result<SyncOutcome> {
        let partition = compare_sets(local, remote)?;
        let mut outcome = SyncOutcome::default();

        for sg in &partition.removed {
            debug!(
                group_id = %sg.id,
                external_id = sg.external_id.as_deref().unwrap_or_default(),
                "Security group no longer reported by provider"
            );
            outcome.result.removed.push(sg.id);
        }

        for (sg, ext) in partition
            .common_local
            .iter()
            .zip(partition.common_remote.iter())
        {
            match self.sync_with_remote(sg, ext) {
                Ok(updated) => {
                    if updated.name != sg.name || updated.description != sg.description {
                        outcome.changed.push(updated.id);
                    }
                    outcome.local.push(updated);
                    outcome.remote.push(ext.clone());
                    outcome.result.update();
                }
                Err(e) => {
                    error!(
                        group_id = %sg.id,
                        external_id = %ext.global_id,
                        error = %e,
                        "Failed to sync security group"
                    );
                    outcome.result.update_error(&ext.global_id, &e);
                }
            }
        }

        for ext in &partition.added {
            match self.create_from_remote(ext) {
                Ok(created) => {
                    debug!(
                        group_id = %created.id,
                        external_id = %ext.global_id,
                        "Created security group from provider"
                    );
                    outcome.local.push(created);
                    outcome.remote.push(ext.clone());
                    outcome.result.add();
                }
                Err(e) => {
                    error!(
                        external_id = %ext.global_id,
                        error = %e,
                        "Failed to create security group from provider"
                    );
                    outcome.result.add_error(&ext.global_id, &e);
                }
            }
        }

        if outcome.result.is_degraded() {
            warn!(result = %outcome.result, "Security group sync degraded");
        } else {
            info!(result = %outcome.result, "Security group sync complete");
        }

        Ok(outcome)
    }

    /// Overwrite name and description from the provider.
    fn sync_with_remote(
        &self,
        sg: &SecurityGroupData,
        ext: &RemoteSecurityGroup,
    ) -> Result<SecurityGroupData> {
        let patch = SecurityGroupPatch::new()
            .name(ext.name.clone())
            .description(ext.description.clone());
        patch.validate()?;

        Ok(self.store.update_security_group(&sg.id, &patch)?)
    }

    fn create_from_remote(&self, ext: &RemoteSecurityGroup) -> Result<SecurityGroupData> {
        if ext.name.trim().is_empty() {
            return Err(SecGroupError::InvalidArgument(format!(
                "provider group {} has an empty name",
                ext.global_id
            )));
        }

        let sg = SecurityGroupData::from_remote(
            ext.global_id.clone(),
            ext.name.clone(),
            ext.description.clone(),
            self.project_id.to_string(),
        );
        self.store.create_security_group(&sg)?;
        Ok(sg)
    }
}
