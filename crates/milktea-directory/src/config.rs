//! Store configuration.
//!
//! Connection tuning for [`SqliteStore`](crate::store::SqliteStore). The
//! defaults suit many processes sharing one database file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for how a store connection is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct StoreConfig {
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
    /// Enforce `REFERENCES` clauses (client accounts, instance metadata).
    pub enforce_foreign_keys: bool,
    /// Use write-ahead logging. Ignored for in-memory databases.
    pub wal: bool,
}

impl StoreConfig {
    pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
    pub const DB_FILE_NAME: &'static str = "directory.db";
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(StoreConfig::DEFAULT_BUSY_TIMEOUT_MS),
            enforce_foreign_keys: true,
            wal: true,
        }
    }
}
