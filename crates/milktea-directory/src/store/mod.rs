//! Persistence layer for the directory.
//!
//! The registries depend only on the traits in this module. [`SqliteStore`]
//! is the bundled backend; every table lives in one database file.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{Entity, PublishedInstances, Repository};
