//! Security group, rule and attachment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SecGroupError};

/// Separator between rendered rules in a group's rule string.
pub const SECURITY_GROUP_SEPARATOR: &str = ";";

/// Traffic direction a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    Ingress,
    Egress,
}

impl RuleDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleDirection::Ingress => "ingress",
            RuleDirection::Egress => "egress",
        }
    }

    /// Short form used in rendered rule strings.
    pub fn rule_prefix(&self) -> &'static str {
        match self {
            RuleDirection::Ingress => "in",
            RuleDirection::Egress => "out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ingress" | "in" => Some(RuleDirection::Ingress),
            "egress" | "out" => Some(RuleDirection::Egress),
            _ => None,
        }
    }
}

/// Protocol matched by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleProtocol {
    Any,
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
}

impl RuleProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleProtocol::Any => "any",
            RuleProtocol::Tcp => "tcp",
            RuleProtocol::Udp => "udp",
            RuleProtocol::Icmp => "icmp",
            RuleProtocol::Icmpv6 => "icmpv6",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "any" | "all" => Some(RuleProtocol::Any),
            "tcp" => Some(RuleProtocol::Tcp),
            "udp" => Some(RuleProtocol::Udp),
            "icmp" => Some(RuleProtocol::Icmp),
            "icmpv6" => Some(RuleProtocol::Icmpv6),
            _ => None,
        }
    }
}

/// What happens to traffic a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(RuleAction::Allow),
            "deny" => Some(RuleAction::Deny),
            _ => None,
        }
    }
}

/// Security group row.
///
/// `external_id` is only set for groups discovered through a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityGroupData {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub project_id: String,
    pub external_id: Option<String>,
    pub is_dirty: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecurityGroupData {
    /// A locally managed group with a fresh id.
    pub fn new(name: String, description: Option<String>, project_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            project_id,
            external_id: None,
            is_dirty: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// A group seeded from a provider resource.
    pub fn from_remote(
        global_id: String,
        name: String,
        description: Option<String>,
        project_id: String,
    ) -> Self {
        Self {
            external_id: Some(global_id),
            ..Self::new(name, description, project_id)
        }
    }

    pub fn is_external(&self) -> bool {
        self.external_id.is_some()
    }
}

/// One rule of a group. Rules are kept in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityGroupRuleData {
    pub id: Uuid,
    pub security_group_id: Uuid,
    pub priority: i32,
    pub protocol: RuleProtocol,
    pub ports: String,
    pub direction: RuleDirection,
    pub cidr: String,
    pub action: RuleAction,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SecurityGroupRuleData {
    /// Canonical rule string, e.g. `in:allow 10.0.0.0/8 tcp 22`.
    pub fn rule_string(&self) -> String {
        let mut out = format!(
            "{}:{}",
            self.direction.rule_prefix(),
            self.action.as_str()
        );
        if !self.cidr.is_empty() {
            out.push(' ');
            out.push_str(&self.cidr);
        }
        out.push(' ');
        out.push_str(self.protocol.as_str());
        if !self.ports.is_empty() {
            out.push(' ');
            out.push_str(&self.ports);
        }
        out
    }

    /// Copy of this rule owned by another group.
    pub fn copy_for_group(&self, security_group_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            security_group_id,
            created_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Fields that define the rule's policy, without identity or ownership.
    pub fn spec(&self) -> RuleSpec {
        RuleSpec {
            priority: self.priority,
            protocol: self.protocol,
            ports: self.ports.clone(),
            direction: self.direction,
            cidr: self.cidr.clone(),
            action: self.action,
            description: self.description.clone(),
        }
    }
}

/// A rule as submitted by a caller, before it belongs to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub priority: i32,
    pub protocol: RuleProtocol,
    #[serde(default)]
    pub ports: String,
    pub direction: RuleDirection,
    #[serde(default)]
    pub cidr: String,
    pub action: RuleAction,
    #[serde(default)]
    pub description: Option<String>,
}

impl RuleSpec {
    pub fn into_rule(self, security_group_id: Uuid) -> SecurityGroupRuleData {
        SecurityGroupRuleData {
            id: Uuid::new_v4(),
            security_group_id,
            priority: self.priority,
            protocol: self.protocol,
            ports: self.ports,
            direction: self.direction,
            cidr: self.cidr,
            action: self.action,
            description: self.description,
            created_at: Utc::now(),
        }
    }
}

/// Render a rule set as one order-preserving string.
pub fn render_rules(rules: &[SecurityGroupRuleData]) -> String {
    rules
        .iter()
        .map(|r| r.rule_string())
        .collect::<Vec<_>>()
        .join(SECURITY_GROUP_SEPARATOR)
}

/// Explicit set of group fields to change.
///
/// Fields left as `None` are not touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityGroupPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub is_dirty: Option<bool>,
}

impl SecurityGroupPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn dirty(mut self, dirty: bool) -> Self {
        self.is_dirty = Some(dirty);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.is_dirty.is_none()
    }

    /// Reject patches the store must never see.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(SecGroupError::InvalidArgument(
                "patch changes no fields".to_string(),
            ));
        }
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(SecGroupError::InvalidArgument(
                "security group name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply the patch to an in-memory copy of the row.
    pub fn apply(&self, group: &mut SecurityGroupData) {
        if let Some(name) = &self.name {
            group.name = name.clone();
        }
        if let Some(description) = &self.description {
            group.description = description.clone();
        }
        if let Some(dirty) = self.is_dirty {
            group.is_dirty = dirty;
        }
        group.updated_at = Utc::now();
    }
}

/// How an instance references a security group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceRole {
    Primary,
    Admin,
}

impl InstanceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceRole::Primary => "primary",
            InstanceRole::Admin => "admin",
        }
    }
}

/// A group with the derived fields API consumers display.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityGroupDetails {
    #[serde(flatten)]
    pub group: SecurityGroupData,
    pub instance_count: u32,
    pub rules: String,
}
