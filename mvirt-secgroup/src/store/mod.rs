//! Persistence for security groups, rules and instance attachments.

mod error;
mod sqlite;
mod traits;

pub use error::{Result, StorageError};
pub use sqlite::Storage;
pub use traits::GroupStore;
