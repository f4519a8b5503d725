//! Per-run tally of reconciliation actions.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Which reconciliation step an item failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOp {
    Add,
    Update,
}

/// One item the run could not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub op: SyncOp,
    pub external_id: String,
    pub message: String,
}

/// How a completed run should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Every add and update succeeded.
    Synced,
    /// The run completed but some items failed; retry them later.
    Degraded,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Degraded => "degraded",
        }
    }
}

/// Counts for one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub added: u32,
    pub updated: u32,
    pub add_errors: u32,
    pub update_errors: u32,
    /// Local groups the provider no longer lists. Recorded only.
    pub removed: Vec<Uuid>,
    pub failures: Vec<SyncFailure>,
}

impl SyncResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self) {
        self.added += 1;
    }

    pub fn update(&mut self) {
        self.updated += 1;
    }

    pub fn add_error(&mut self, external_id: &str, err: impl fmt::Display) {
        self.add_errors += 1;
        self.failures.push(SyncFailure {
            op: SyncOp::Add,
            external_id: external_id.to_string(),
            message: err.to_string(),
        });
    }

    pub fn update_error(&mut self, external_id: &str, err: impl fmt::Display) {
        self.update_errors += 1;
        self.failures.push(SyncFailure {
            op: SyncOp::Update,
            external_id: external_id.to_string(),
            message: err.to_string(),
        });
    }

    pub fn error_count(&self) -> u32 {
        self.add_errors + self.update_errors
    }

    /// Number of add and update attempts the run made.
    pub fn attempted(&self) -> u32 {
        self.added + self.updated + self.error_count()
    }

    pub fn is_degraded(&self) -> bool {
        self.error_count() > 0
    }

    pub fn status(&self) -> SyncStatus {
        if self.is_degraded() {
            SyncStatus::Degraded
        } else {
            SyncStatus::Synced
        }
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added={} updated={} add_errors={} update_errors={} removed={}",
            self.added,
            self.updated,
            self.add_errors,
            self.update_errors,
            self.removed.len()
        )
    }
}
