//! Milktea Directory - registry of federated instances and push subscriptions.
//!
//! Remote instances ask to join with [`InstanceRegistry::request`], stay
//! hidden until [`InstanceRegistry::approve`], and are then listed by
//! [`InstanceRegistry::list_published`]. [`SubscriptionRegistry`] records at
//! most one push subscription per remote account, client account and
//! instance.
//!
//! # Example
//!
//! ```rust,no_run
//! use milktea_directory::Directory;
//! use std::path::Path;
//!
//! fn main() -> milktea_directory::Result<()> {
//!     let directory = Directory::open(Path::new("/var/lib/milktea/directory.db"))?;
//!
//!     let instance = directory.instances().request("mastodon.example")?;
//!     directory.instances().approve(instance.id)?;
//!
//!     for info in directory.instances().list_published()? {
//!         println!("{} published at {}", info.host, info.published_at);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod store;

mod directory;

pub use config::StoreConfig;
pub use directory::Directory;
pub use error::{DirectoryError, Result, StoreError, StoreResult};
pub use model::{
    Instance, InstanceCriteria, InstanceField, InstanceInfo, InstanceMeta, Publication,
    PushSubscription, SubscriptionCriteria, SubscriptionField, SubscriptionKey,
};
pub use registry::{InstanceRegistry, SubscriptionRegistry};
pub use store::{Entity, PublishedInstances, Repository, SqliteStore};
