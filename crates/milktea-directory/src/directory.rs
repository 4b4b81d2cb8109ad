//! Both registries wired to one shared store.

use crate::error::Result;
use crate::registry::{InstanceRegistry, SubscriptionRegistry};
use crate::store::SqliteStore;
use crate::StoreConfig;
use std::path::Path;
use std::sync::Arc;

/// The instance directory backed by a single SQLite database.
#[derive(Clone)]
pub struct Directory {
    store: Arc<SqliteStore>,
    instances: InstanceRegistry<SqliteStore>,
    subscriptions: SubscriptionRegistry<SqliteStore>,
}

impl Directory {
    /// Open (or create) the directory database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::open_with_config(db_path, StoreConfig::default())
    }

    pub fn open_with_config(db_path: &Path, config: StoreConfig) -> Result<Self> {
        let store = SqliteStore::with_config(db_path, config)?;
        Ok(Self::from_store(Arc::new(store)))
    }

    pub fn from_store(store: Arc<SqliteStore>) -> Self {
        Self {
            instances: InstanceRegistry::new(Arc::clone(&store)),
            subscriptions: SubscriptionRegistry::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn instances(&self) -> &InstanceRegistry<SqliteStore> {
        &self.instances
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry<SqliteStore> {
        &self.subscriptions
    }

    /// The underlying store, for collaborators that own client accounts and
    /// instance metadata.
    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }
}
