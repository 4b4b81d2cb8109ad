//! Push subscription records.

use crate::store::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The identity of a subscription: one per remote account, per client
/// account, per instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionKey {
    pub acct: String,
    pub client_account_id: Uuid,
    pub instance_uri: String,
}

impl SubscriptionKey {
    pub fn new(
        acct: impl Into<String>,
        client_account_id: Uuid,
        instance_uri: impl Into<String>,
    ) -> Self {
        Self {
            acct: acct.into(),
            client_account_id,
            instance_uri: instance_uri.into(),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} for client account {} on {}",
            self.acct, self.client_account_id, self.instance_uri
        )
    }
}

/// A push-notification subscription bound to a client account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub id: Uuid,
    /// Push transport tag, e.g. `"fcm"`.
    pub provider_type: String,
    pub acct: String,
    pub client_account_id: Uuid,
    pub instance_uri: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PushSubscription {
    pub fn new(provider_type: impl Into<String>, key: SubscriptionKey, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_type: provider_type.into(),
            acct: key.acct,
            client_account_id: key.client_account_id,
            instance_uri: key.instance_uri,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(
            self.acct.clone(),
            self.client_account_id,
            self.instance_uri.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionCriteria {
    Id(Uuid),
    Key(SubscriptionKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionField {
    ProviderType(String),
}

impl Entity for PushSubscription {
    const NAME: &'static str = "push subscription";
    type Id = Uuid;
    type Criteria = SubscriptionCriteria;
    type Field = SubscriptionField;
}
