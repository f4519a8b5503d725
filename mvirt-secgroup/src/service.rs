//! Security group service - the entry point the daemon and API layers hold.
//!
//! Built once at startup from its collaborators and shared by reference.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clone::{CloneRequest, clone_security_group};
use crate::error::{Result, SecGroupError};
use crate::model::{
    RuleSpec, SecurityGroupData, SecurityGroupDetails, SecurityGroupPatch, SecurityGroupRuleData,
    render_rules,
};
use crate::notify::InstanceNotifier;
use crate::provider::{ProviderCredentials, SecurityGroupProvider};
use crate::store::GroupStore;
use crate::sync::{SecurityGroupReconciler, SyncOutcome};

/// Request to create a locally managed security group.
#[derive(Debug, Clone)]
pub struct CreateSecurityGroupRequest {
    pub name: String,
    pub description: Option<String>,
    pub project_id: String,
    pub rules: Vec<RuleSpec>,
}

pub struct SecGroupService {
    store: Arc<dyn GroupStore>,
    provider: Arc<dyn SecurityGroupProvider>,
    notifier: Arc<dyn InstanceNotifier>,
    /// Held for a whole sync run. Runs for different projects still share
    /// one store and one external id namespace.
    sync_lock: tokio::sync::Mutex<()>,
}

impl SecGroupService {
    pub fn new(
        store: Arc<dyn GroupStore>,
        provider: Arc<dyn SecurityGroupProvider>,
        notifier: Arc<dyn InstanceNotifier>,
    ) -> Self {
        Self {
            store,
            provider,
            notifier,
            sync_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &dyn GroupStore {
        self.store.as_ref()
    }

    // ========== Reconciliation ==========

    /// Run one reconciliation for `project_id`.
    ///
    /// Groups whose name or description changed are marked dirty and their
    /// instances notified. A failed listing or an identity conflict is
    /// returned as an error; per-item failures are in the outcome's result.
    /// Runs are serialized across all projects.
    pub async fn sync_scope(
        &self,
        project_id: &str,
        credentials: &ProviderCredentials,
    ) -> Result<SyncOutcome> {
        let _guard = self.sync_lock.lock().await;

        let remote = self
            .provider
            .list_security_groups(credentials)
            .await
            .inspect_err(|e| {
                error!(project_id, error = %e, "Failed to list provider security groups")
            })?;

        let outcome =
            SecurityGroupReconciler::new(self.store.as_ref(), project_id).sync(&remote)?;

        for id in &outcome.changed {
            if let Err(e) = self.mark_for_sync(id).await {
                warn!(group_id = %id, error = %e, "Failed to mark security group for sync");
            }
        }

        Ok(outcome)
    }

    // ========== Group Operations ==========

    pub fn create_security_group(
        &self,
        req: CreateSecurityGroupRequest,
    ) -> Result<SecurityGroupData> {
        if req.name.trim().is_empty() {
            return Err(SecGroupError::InvalidArgument(
                "security group name must not be empty".to_string(),
            ));
        }
        if self.store.count_by_name(&req.project_id, &req.name)? > 0 {
            return Err(SecGroupError::DuplicateName(req.name));
        }

        let group = SecurityGroupData::new(req.name, req.description, req.project_id);
        let rules: Vec<_> = req
            .rules
            .into_iter()
            .map(|spec| spec.into_rule(group.id))
            .collect();
        self.store.create_security_group_with_rules(&group, &rules)?;

        info!(group_id = %group.id, name = %group.name, "Security group created");
        Ok(group)
    }

    pub fn get_security_group(&self, id: &Uuid) -> Result<SecurityGroupData> {
        self.store
            .get_security_group_by_id(id)?
            .ok_or_else(|| SecGroupError::NotFound(format!("security group {id}")))
    }

    /// The group plus its instance count and rendered rule string.
    pub fn get_details(&self, id: &Uuid) -> Result<SecurityGroupDetails> {
        let group = self.get_security_group(id)?;
        let instance_count = self.store.count_instances_for_group(id)?;
        let rules = render_rules(&self.store.list_rules_for_security_group(id)?);

        Ok(SecurityGroupDetails {
            group,
            instance_count,
            rules,
        })
    }

    pub fn add_rule(&self, group_id: &Uuid, spec: RuleSpec) -> Result<SecurityGroupRuleData> {
        let rule = spec.into_rule(*group_id);
        self.store.create_security_group_rule(&rule)?;
        Ok(rule)
    }

    pub fn clone_security_group(
        &self,
        source_id: &Uuid,
        req: &CloneRequest,
    ) -> Result<SecurityGroupData> {
        clone_security_group(self.store.as_ref(), source_id, req)
    }

    /// Delete a group on explicit request. The reconciler never does this.
    pub fn delete_security_group(&self, id: &Uuid) -> Result<()> {
        if !self.store.delete_security_group(id)? {
            return Err(SecGroupError::NotFound(format!("security group {id}")));
        }
        info!(group_id = %id, "Security group deleted");
        Ok(())
    }

    // ========== Dirty tracking ==========

    /// Flag the group dirty and ask every referencing instance to resync.
    ///
    /// A failure to set the flag is logged; instances are notified anyway.
    /// Returns how many instances were notified successfully.
    pub async fn mark_for_sync(&self, id: &Uuid) -> Result<u32> {
        self.get_security_group(id)?;
        if let Err(e) = self
            .store
            .update_security_group(id, &SecurityGroupPatch::new().dirty(true))
        {
            warn!(group_id = %id, error = %e, "Failed to mark security group dirty");
        }

        let mut notified = 0;
        for instance_id in self.store.list_instances_for_group(id)? {
            match self.notifier.start_sync(&instance_id, id).await {
                Ok(()) => notified += 1,
                Err(e) => {
                    warn!(instance_id, group_id = %id, error = %e, "Failed to notify instance")
                }
            }
        }
        Ok(notified)
    }

    pub fn clear_dirty(&self, id: &Uuid) -> Result<SecurityGroupData> {
        Ok(self
            .store
            .update_security_group(id, &SecurityGroupPatch::new().dirty(false))?)
    }
}
