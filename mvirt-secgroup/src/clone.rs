//! Copy a security group together with its rule set.

use tracing::info;
use uuid::Uuid;

use crate::error::{Result, SecGroupError};
use crate::model::SecurityGroupData;
use crate::store::GroupStore;

/// Parameters for a clone.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub name: String,
    pub description: Option<String>,
    /// Project that will own the copy; names are unique within it.
    pub project_id: String,
}

impl CloneRequest {
    pub fn new(name: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            project_id: project_id.into(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SecGroupError::InvalidArgument(
                "missing name for cloned security group".to_string(),
            ));
        }
        if self.project_id.is_empty() {
            return Err(SecGroupError::InvalidArgument(
                "missing owner project for cloned security group".to_string(),
            ));
        }
        Ok(())
    }
}

/// Clone `source_id` into a new locally managed group.
///
/// The new group and all copied rules are written in one transaction, so a
/// failure leaves nothing behind. Two concurrent clones to the same name
/// have one winner; the store's unique index rejects the other with
/// `DuplicateName`.
pub fn clone_security_group(
    store: &dyn GroupStore,
    source_id: &Uuid,
    req: &CloneRequest,
) -> Result<SecurityGroupData> {
    req.validate()?;

    let source = store
        .get_security_group_by_id(source_id)?
        .ok_or_else(|| SecGroupError::NotFound(format!("security group {source_id}")))?;

    if store.count_by_name(&req.project_id, &req.name)? > 0 {
        return Err(SecGroupError::DuplicateName(req.name.clone()));
    }

    let group = SecurityGroupData::new(
        req.name.clone(),
        req.description.clone(),
        req.project_id.clone(),
    );
    let rules: Vec<_> = store
        .list_rules_for_security_group(&source.id)?
        .iter()
        .map(|r| r.copy_for_group(group.id))
        .collect();

    store.create_security_group_with_rules(&group, &rules)?;

    info!(
        source_id = %source.id,
        group_id = %group.id,
        name = %group.name,
        rules = rules.len(),
        "Cloned security group"
    );
    Ok(group)
}
