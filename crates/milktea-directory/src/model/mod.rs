//! Domain records owned by the registries.
//!
//! - [`Instance`] and its read-model [`InstanceInfo`]
//! - [`PushSubscription`] keyed by [`SubscriptionKey`]

mod instance;
mod subscription;

pub use instance::{
    Instance, InstanceCriteria, InstanceField, InstanceInfo, InstanceMeta, Publication,
};
pub use subscription::{
    PushSubscription, SubscriptionCriteria, SubscriptionField, SubscriptionKey,
};
