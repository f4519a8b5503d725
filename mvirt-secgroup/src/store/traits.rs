//! GroupStore trait definition.
//!
//! Reconciliation and cloning only talk to this trait, so they stay
//! independent of the storage engine behind it.

use uuid::Uuid;

use super::error::Result;
use crate::model::{InstanceRole, SecurityGroupData, SecurityGroupPatch, SecurityGroupRuleData};

/// Store trait for security group operations.
pub trait GroupStore: Send + Sync {
    // ========== Queries ==========

    /// List every group, local and provider-synced.
    fn list_security_groups(&self) -> Result<Vec<SecurityGroupData>>;

    /// List groups owned by a project.
    fn list_security_groups_by_project(&self, project_id: &str) -> Result<Vec<SecurityGroupData>>;

    /// Get a group by ID.
    fn get_security_group_by_id(&self, id: &Uuid) -> Result<Option<SecurityGroupData>>;

    /// Get the group mapped to a provider identity.
    fn find_by_external_id(&self, external_id: &str) -> Result<Option<SecurityGroupData>>;

    /// Count locally managed groups named `name` in a project.
    fn count_by_name(&self, project_id: &str, name: &str) -> Result<u32>;

    /// Count all groups in a project.
    fn count_security_groups_in_project(&self, project_id: &str) -> Result<u32>;

    // ========== Group mutations ==========

    /// Insert a group row.
    fn create_security_group(&self, sg: &SecurityGroupData) -> Result<()>;

    /// Insert a group and its rules atomically. On error nothing is written.
    fn create_security_group_with_rules(
        &self,
        sg: &SecurityGroupData,
        rules: &[SecurityGroupRuleData],
    ) -> Result<()>;

    /// Apply a patch to a group in one transaction and return the new row.
    fn update_security_group(&self, id: &Uuid, patch: &SecurityGroupPatch)
    -> Result<SecurityGroupData>;

    /// Delete a group; its rules and attachments go with it.
    fn delete_security_group(&self, id: &Uuid) -> Result<bool>;

    // ========== Rules ==========

    /// List a group's rules in insertion order.
    fn list_rules_for_security_group(&self, sg_id: &Uuid) -> Result<Vec<SecurityGroupRuleData>>;

    /// Append a rule to its group.
    fn create_security_group_rule(&self, rule: &SecurityGroupRuleData) -> Result<()>;

    // ========== Instance attachments ==========

    fn attach_instance(&self, instance_id: &str, sg_id: &Uuid, role: InstanceRole)
    -> Result<bool>;

    fn detach_instance(&self, instance_id: &str, sg_id: &Uuid, role: InstanceRole)
    -> Result<bool>;

    /// Instances referencing the group in any role, each listed once.
    fn list_instances_for_group(&self, sg_id: &Uuid) -> Result<Vec<String>>;

    fn count_instances_for_group(&self, sg_id: &Uuid) -> Result<u32>;
}
