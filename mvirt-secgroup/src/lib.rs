//! mvirt-secgroup: keeps local security groups in step with a cloud provider.
//!
//! - `sync` partitions the local store against a provider listing and
//!   applies updates and additions, tallying per-item failures
//! - `clone` copies a group and its ordered rule set under a new name
//! - `store` is the SQLite-backed persistence behind both
//! - `service` wires store, provider and instance notifier together

pub mod clone;
pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod provider;
pub mod service;
pub mod store;
pub mod sync;

pub use clone::{CloneRequest, clone_security_group};
pub use config::Config;
pub use error::{Result, SecGroupError};
pub use model::{
    InstanceRole, RuleAction, RuleDirection, RuleProtocol, RuleSpec, SECURITY_GROUP_SEPARATOR,
    SecurityGroupData, SecurityGroupDetails, SecurityGroupPatch, SecurityGroupRuleData,
    render_rules,
};
pub use notify::{InstanceNotifier, LoggingNotifier};
pub use provider::{
    JsonSnapshotProvider, ProviderCredentials, RemoteSecurityGroup, SecurityGroupProvider,
    StaticProvider,
};
pub use service::{CreateSecurityGroupRequest, SecGroupService};
pub use store::{GroupStore, Storage, StorageError};
pub use sync::{SecurityGroupReconciler, SyncOutcome, SyncResult, SyncStatus};
