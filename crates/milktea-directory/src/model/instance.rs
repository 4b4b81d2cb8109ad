//! Instance records and the published-instance read-model.

use crate::store::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Approval state of an instance.
///
/// Stored as a nullable `published_at` column; everywhere else the two
/// states are distinct variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Publication {
    Pending,
    Published { at: DateTime<Utc> },
}

impl Publication {
    /// Decode the storage representation.
    pub fn from_published_at(published_at: Option<DateTime<Utc>>) -> Self {
        match published_at {
            Some(at) => Publication::Published { at },
            None => Publication::Pending,
        }
    }

    /// Encode to the storage representation.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Publication::Pending => None,
            Publication::Published { at } => Some(*at),
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Publication::Published { .. })
    }

    /// Pending moves to published at `now`; an existing timestamp is kept.
    pub fn publish(self, now: DateTime<Utc>) -> Self {
        match self {
            Publication::Pending => Publication::Published { at: now },
            published => published,
        }
    }
}

impl Serialize for Publication {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.published_at().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Publication {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<DateTime<Utc>>::deserialize(deserializer).map(Publication::from_published_at)
    }
}

/// A remote peer node known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: Uuid,
    pub host: String,
    #[serde(rename = "publishedAt")]
    pub publication: Publication,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion marker, written outside this crate.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// A fresh, unapproved instance for `host`.
    pub fn pending(host: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            host: host.into(),
            publication: Publication::Pending,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.publication.published_at()
    }

    pub fn is_published(&self) -> bool {
        self.publication.is_published()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// How to locate a single instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceCriteria {
    Id(Uuid),
    Host(String),
}

/// A named column an instance update may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceField {
    /// Set-once: a row that is already published keeps its timestamp.
    PublishedAt(DateTime<Utc>),
    DeletedAt(Option<DateTime<Utc>>),
}

impl Entity for Instance {
    const NAME: &'static str = "instance";
    type Id = Uuid;
    type Criteria = InstanceCriteria;
    type Field = InstanceField;
}

/// Metadata about an instance, refreshed by a crawler outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMeta {
    pub instance_id: Uuid,
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub software_name: Option<String>,
    pub software_version: Option<String>,
    /// Remaining fields of the remote meta document.
    #[serde(default)]
    pub extra: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl InstanceMeta {
    pub fn new(instance_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            instance_id,
            name: None,
            description: None,
            icon_url: None,
            software_name: None,
            software_version: None,
            extra: serde_json::Value::Object(serde_json::Map::new()),
            updated_at: now,
        }
    }
}

/// A published instance joined with its metadata, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub id: Uuid,
    pub host: String,
    pub published_at: DateTime<Utc>,
    pub meta: Option<InstanceMeta>,
}
