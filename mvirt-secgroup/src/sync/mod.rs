//! Reconciliation of local security groups with a provider.
//!
//! A run partitions the local store and the provider listing by external id,
//! refreshes matched groups, creates groups for newly discovered resources and
//! records (but never deletes) groups the provider stopped reporting.

pub mod compare;
pub mod reconciler;
pub mod result;

pub use compare::{Partition, compare_sets};
pub use reconciler::{SecurityGroupReconciler, SyncOutcome};
pub use result::{SyncFailure, SyncOp, SyncResult, SyncStatus};
