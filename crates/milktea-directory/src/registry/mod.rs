//! Registries for instances and push subscriptions.
//!
//! Each registry is built with an explicit store handle and relies on the
//! store's unique constraints for correctness under concurrent callers:
//! - [`InstanceRegistry`] turns a lost host-insert race into a re-read
//! - [`SubscriptionRegistry`] turns a duplicate key into a conflict

mod instances;
mod subscriptions;

pub use instances::InstanceRegistry;
pub use subscriptions::SubscriptionRegistry;
