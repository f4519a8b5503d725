//! Daemon configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::provider::ProviderCredentials;

/// mvirt security group sync daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "mvirt-secgroup", version, about)]
pub struct Config {
    /// SQLite database path
    #[arg(long, default_value = "/var/lib/mvirt/secgroup/secgroups.db")]
    pub db_path: PathBuf,

    /// Provider snapshot file (JSON array of {global_id, name, description})
    #[arg(long)]
    pub snapshot: PathBuf,

    /// Project that owns groups discovered at the provider
    #[arg(long, default_value = "system")]
    pub project: String,

    /// Provider account used for listings
    #[arg(long, default_value = "default")]
    pub account: String,

    /// Provider region
    #[arg(long)]
    pub region: Option<String>,

    /// Seconds between reconciliation runs
    #[arg(long, default_value = "60")]
    pub interval: u64,

    /// Run a single reconciliation and exit
    #[arg(long)]
    pub once: bool,
}

impl Config {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }

    pub fn credentials(&self) -> ProviderCredentials {
        ProviderCredentials {
            account: self.account.clone(),
            region: self.region.clone(),
        }
    }
}
