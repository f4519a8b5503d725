//! Notification of compute instances whose security policy may have changed.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

/// Asks the compute side to re-apply a group's policy on an instance.
#[async_trait]
pub trait InstanceNotifier: Send + Sync {
    async fn start_sync(&self, instance_id: &str, group_id: &Uuid) -> Result<()>;
}

/// Notifier that only records the request in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl InstanceNotifier for LoggingNotifier {
    async fn start_sync(&self, instance_id: &str, group_id: &Uuid) -> Result<()> {
        info!(instance_id, group_id = %group_id, "Instance sync requested");
        Ok(())
    }
}
