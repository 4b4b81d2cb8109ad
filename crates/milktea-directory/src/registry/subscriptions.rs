//! Push subscription registration.

use crate::error::{DirectoryError, Result, StoreError};
use crate::model::{PushSubscription, SubscriptionCriteria, SubscriptionKey};
use crate::store::{Entity, Repository};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const ENTITY: &str = <PushSubscription as Entity>::NAME;

/// Creates and looks up [`PushSubscription`] records.
///
/// At most one subscription exists per [`SubscriptionKey`]. A second
/// subscribe for the same key is rejected rather than merged.
pub struct SubscriptionRegistry<S> {
    store: Arc<S>,
}

impl<S> Clone for SubscriptionRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> SubscriptionRegistry<S>
where
    S: Repository<PushSubscription>,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn subscribe(
        &self,
        provider_type: &str,
        acct: &str,
        client_account_id: Uuid,
        instance_uri: &str,
    ) -> Result<PushSubscription> {
        let provider_type = required("provider_type", provider_type)?;
        let acct = required("acct", acct)?;
        let instance_uri = required("instance_uri", instance_uri)?;

        let key = SubscriptionKey::new(acct, client_account_id, instance_uri);
        let candidate = PushSubscription::new(provider_type, key, Utc::now());

        match self.store.create(&candidate) {
            Ok(created) => {
                debug!(
                    "Subscribed {} via {} ({})",
                    created.acct, created.provider_type, created.id
                );
                Ok(created)
            }
            Err(StoreError::UniqueViolation { .. }) => Err(DirectoryError::Conflict {
                entity: ENTITY,
                message: format!("already subscribed: {}", candidate.key()),
            }),
            Err(StoreError::ForeignKeyViolation { .. }) => Err(DirectoryError::not_found(
                "client account",
                client_account_id,
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_by_key(
        &self,
        acct: &str,
        client_account_id: Uuid,
        instance_uri: &str,
    ) -> Result<PushSubscription> {
        let key = SubscriptionKey::new(acct.trim(), client_account_id, instance_uri.trim());
        match self.store.find_one(&SubscriptionCriteria::Key(key.clone())) {
            Ok(subscription) => Ok(subscription),
            Err(StoreError::NotFound) => Err(DirectoryError::not_found(ENTITY, key)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<PushSubscription> {
        match self.store.find_one(&SubscriptionCriteria::Id(id)) {
            Ok(subscription) => Ok(subscription),
            Err(StoreError::NotFound) => Err(DirectoryError::not_found(ENTITY, id)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Trimmed `value`, or a validation error when nothing is left.
fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DirectoryError::empty_field(field));
    }
    Ok(value)
}
