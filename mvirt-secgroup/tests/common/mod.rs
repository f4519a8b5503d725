//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use mvirt_secgroup::store::Result;
use mvirt_secgroup::{
    GroupStore, InstanceNotifier, InstanceRole, RuleAction, RuleDirection, RuleProtocol, RuleSpec,
    SecurityGroupData, SecurityGroupPatch, SecurityGroupRuleData, Storage, StorageError,
};
use uuid::Uuid;

/// Store wrapper that fails writes for selected groups.
pub struct FailingStore {
    pub inner: Storage,
    /// External ids whose insert fails.
    pub fail_create: HashSet<String>,
    /// Group ids whose update fails.
    pub fail_update: HashSet<Uuid>,
    pub create_attempts: Mutex<Vec<String>>,
}

impl FailingStore {
    pub fn new(inner: Storage) -> Self {
        Self {
            inner,
            fail_create: HashSet::new(),
            fail_update: HashSet::new(),
            create_attempts: Mutex::new(Vec::new()),
        }
    }

    fn injected() -> StorageError {
        StorageError::Corrupt("injected failure".to_string())
    }
}

impl GroupStore for FailingStore {
    fn list_security_groups(&self) -> Result<Vec<SecurityGroupData>> {
        self.inner.list_security_groups()
    }

    fn list_security_groups_by_project(&self, project_id: &str) -> Result<Vec<SecurityGroupData>> {
        self.inner.list_security_groups_by_project(project_id)
    }

    fn get_security_group_by_id(&self, id: &Uuid) -> Result<Option<SecurityGroupData>> {
        self.inner.get_security_group_by_id(id)
    }

    fn find_by_external_id(&self, external_id: &str) -> Result<Option<SecurityGroupData>> {
        self.inner.find_by_external_id(external_id)
    }

    fn count_by_name(&self, project_id: &str, name: &str) -> Result<u32> {
        self.inner.count_by_name(project_id, name)
    }

    fn count_security_groups_in_project(&self, project_id: &str) -> Result<u32> {
        self.inner.count_security_groups_in_project(project_id)
    }

    fn create_security_group(&self, sg: &SecurityGroupData) -> Result<()> {
        let key = sg.external_id.clone().unwrap_or_else(|| sg.name.clone());
        self.create_attempts.lock().unwrap().push(key.clone());
        if self.fail_create.contains(&key) {
            return Err(Self::injected());
        }
        self.inner.create_security_group(sg)
    }

    fn create_security_group_with_rules(
        &self,
        sg: &SecurityGroupData,
        rules: &[SecurityGroupRuleData],
    ) -> Result<()> {
        self.inner.create_security_group_with_rules(sg, rules)
    }

    fn update_security_group(
        &self,
        id: &Uuid,
        patch: &SecurityGroupPatch,
    ) -> Result<SecurityGroupData> {
        if self.fail_update.contains(id) {
            return Err(Self::injected());
        }
        self.inner.update_security_group(id, patch)
    }

    fn delete_security_group(&self, id: &Uuid) -> Result<bool> {
        self.inner.delete_security_group(id)
    }

    fn list_rules_for_security_group(&self, sg_id: &Uuid) -> Result<Vec<SecurityGroupRuleData>> {
        self.inner.list_rules_for_security_group(sg_id)
    }

    fn create_security_group_rule(&self, rule: &SecurityGroupRuleData) -> Result<()> {
        self.inner.create_security_group_rule(rule)
    }

    fn attach_instance(&self, instance_id: &str, sg_id: &Uuid, role: InstanceRole) -> Result<bool> {
        self.inner.attach_instance(instance_id, sg_id, role)
    }

    fn detach_instance(&self, instance_id: &str, sg_id: &Uuid, role: InstanceRole) -> Result<bool> {
        self.inner.detach_instance(instance_id, sg_id, role)
    }

    fn list_instances_for_group(&self, sg_id: &Uuid) -> Result<Vec<String>> {
        self.inner.list_instances_for_group(sg_id)
    }

    fn count_instances_for_group(&self, sg_id: &Uuid) -> Result<u32> {
        self.inner.count_instances_for_group(sg_id)
    }
}

/// Notifier that remembers every request.
#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: Mutex<Vec<(String, Uuid)>>,
}

#[async_trait]
impl InstanceNotifier for RecordingNotifier {
    async fn start_sync(&self, instance_id: &str, group_id: &Uuid) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((instance_id.to_string(), *group_id));
        Ok(())
    }
}

pub fn rule(priority: i32, protocol: RuleProtocol, ports: &str, action: RuleAction) -> RuleSpec {
    RuleSpec {
        priority,
        protocol,
        ports: ports.to_string(),
        direction: RuleDirection::Ingress,
        cidr: "10.0.0.0/8".to_string(),
        action,
        description: Some(format!("{} {}", protocol.as_str(), ports)),
    }
}

/// Insert a provider-synced group.
pub fn synced_group(storage: &dyn GroupStore, ext: &str, name: &str) -> SecurityGroupData {
    let sg = SecurityGroupData::from_remote(
        ext.to_string(),
        name.to_string(),
        None,
        "p1".to_string(),
    );
    storage
        .create_security_group(&sg)
        .expect("Failed to create security group");
    sg
}
