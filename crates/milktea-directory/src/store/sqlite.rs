//! SQLite-backed store for instances, metadata, and push subscriptions.

use super::traits::{PublishedInstances, Repository};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::{
    Instance, InstanceCriteria, InstanceField, InstanceInfo, InstanceMeta, Publication,
    PushSubscription, SubscriptionCriteria, SubscriptionField,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// SQLite store implementing every repository the registries need.
///
/// Uses WAL mode and a busy timeout so several handles (or processes) can
/// share one file, and `Arc<Mutex<Connection>>` for thread safety within a
/// handle. Unique and foreign-key constraints are declared in the schema and
/// reported through [`StoreError`].
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    config: StoreConfig,
}

impl SqliteStore {
    /// Open the store at a specific database path with default settings.
    ///
    /// Creates the database and parent directories if they don't exist.
    pub fn open_at(db_path: &Path) -> StoreResult<Self> {
        Self::with_config(db_path, StoreConfig::default())
    }

    /// Open `directory.db` inside `data_dir`.
    pub fn open_in(data_dir: &Path) -> StoreResult<Self> {
        Self::open_at(&data_dir.join(StoreConfig::DB_FILE_NAME))
    }

    /// Open the store at `db_path` with custom configuration.
    pub fn with_config(db_path: &Path, config: StoreConfig) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                    message: format!("Failed to create store directory: {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::from_connection(conn, config, true)
    }

    /// A private in-memory database, mostly useful in tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, StoreConfig::default(), false)
    }

    fn from_connection(conn: Connection, config: StoreConfig, on_disk: bool) -> StoreResult<Self> {
        Self::configure_connection(&conn, &config, on_disk)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    fn configure_connection(
        conn: &Connection,
        config: &StoreConfig,
        on_disk: bool,
    ) -> StoreResult<()> {
        conn.busy_timeout(config.busy_timeout)?;
        if on_disk && config.wal {
            conn.execute_batch("PRAGMA journal_mode=WAL;\nPRAGMA synchronous=NORMAL;")?;
        }
        conn.execute_batch(if config.enforce_foreign_keys {
            "PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA foreign_keys=OFF;"
        })?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS instances (
                id TEXT PRIMARY KEY,
                host TEXT NOT NULL UNIQUE,
                published_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_instances_published
                ON instances(published_at) WHERE deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS metas (
                instance_id TEXT PRIMARY KEY REFERENCES instances(id),
                name TEXT,
                description TEXT,
                icon_url TEXT,
                software_name TEXT,
                software_version TEXT,
                extra_json TEXT NOT NULL DEFAULT '{}',
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS client_accounts (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS push_subscriptions (
                id TEXT PRIMARY KEY,
                provider_type TEXT NOT NULL,
                acct TEXT NOT NULL,
                client_account_id TEXT NOT NULL REFERENCES client_accounts(id),
                instance_uri TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (acct, client_account_id, instance_uri)
            );

            CREATE INDEX IF NOT EXISTS idx_push_subscriptions_provider
                ON push_subscriptions(provider_type);
            CREATE INDEX IF NOT EXISTS idx_push_subscriptions_client
                ON push_subscriptions(client_account_id);",
        )?;
        Ok(())
    }

    fn lock_conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Database {
            message: "Failed to acquire store connection lock".to_string(),
            source: None,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn instance_count(&self) -> StoreResult<usize> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM instances", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========================================
    // Collaborator write paths
    // ========================================

    /// Record a client account so subscriptions can reference it.
    ///
    /// Client accounts are owned elsewhere; inserting a known id is a no-op.
    pub fn insert_client_account(&self, id: Uuid) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO client_accounts (id, created_at) VALUES (?1, ?2)",
            params![id.to_string(), encode_ts(&Utc::now())],
        )?;
        Ok(())
    }

    /// Insert or replace the metadata row for an instance.
    pub fn upsert_meta(&self, meta: &InstanceMeta) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        let extra_json = serde_json::to_string(&meta.extra).map_err(|e| StoreError::Database {
            message: format!("Failed to encode metadata for {}: {}", meta.instance_id, e),
            source: None,
        })?;

        conn.execute(
            "INSERT INTO metas (instance_id, name, description, icon_url, software_name,
                                software_version, extra_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(instance_id) DO UPDATE SET
                 name=excluded.name,
                 description=excluded.description,
                 icon_url=excluded.icon_url,
                 software_name=excluded.software_name,
                 software_version=excluded.software_version,
                 extra_json=excluded.extra_json,
                 updated_at=excluded.updated_at",
            params![
                meta.instance_id.to_string(),
                meta.name,
                meta.description,
                meta.icon_url,
                meta.software_name,
                meta.software_version,
                extra_json,
                encode_ts(&meta.updated_at),
            ],
        )?;

        debug!("Stored metadata for instance {}", meta.instance_id);
        Ok(())
    }

    // ========================================
    // Row lookups
    // ========================================

    fn find_instance(conn: &Connection, criteria: &InstanceCriteria) -> StoreResult<Instance> {
        let (clause, value) = match criteria {
            InstanceCriteria::Id(id) => ("id = ?1", id.to_string()),
            InstanceCriteria::Host(host) => ("host = ?1", host.clone()),
        };
        let sql = format!(
            "SELECT {} FROM instances WHERE {}",
            InstanceRow::COLUMNS,
            clause
        );

        conn.query_row(&sql, params![value], InstanceRow::from_row)?
            .decode()
    }

    fn find_subscription(
        conn: &Connection,
        criteria: &SubscriptionCriteria,
    ) -> StoreResult<PushSubscription> {
        let row = match criteria {
            SubscriptionCriteria::Id(id) => conn.query_row(
                &format!(
                    "SELECT {} FROM push_subscriptions WHERE id = ?1",
                    SubscriptionRow::COLUMNS
                ),
                params![id.to_string()],
                SubscriptionRow::from_row,
            )?,
            SubscriptionCriteria::Key(key) => conn.query_row(
                &format!(
                    "SELECT {} FROM push_subscriptions
                     WHERE acct = ?1 AND client_account_id = ?2 AND instance_uri = ?3",
                    SubscriptionRow::COLUMNS
                ),
                params![key.acct, key.client_account_id.to_string(), key.instance_uri],
                SubscriptionRow::from_row,
            )?,
        };

        row.decode()
    }
}

impl Repository<Instance> for SqliteStore {
    fn create(&self, instance: &Instance) -> StoreResult<Instance> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO instances (id, host, published_at, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                instance.id.to_string(),
                instance.host,
                instance.published_at().as_ref().map(encode_ts),
                encode_ts(&instance.created_at),
                encode_ts(&instance.updated_at),
                instance.deleted_at.as_ref().map(encode_ts),
            ],
        )?;

        debug!("Created instance {} for {}", instance.id, instance.host);
        Self::find_instance(&conn, &InstanceCriteria::Id(instance.id))
    }

    fn find_one(&self, criteria: &InstanceCriteria) -> StoreResult<Instance> {
        let conn = self.lock_conn()?;
        Self::find_instance(&conn, criteria)
    }

    fn update_fields(&self, id: &Uuid, fields: &[InstanceField]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut assignments = Vec::with_capacity(fields.len() + 1);
        let mut values: Vec<Option<String>> = Vec::with_capacity(fields.len() + 2);
        for field in fields {
            let n = values.len() + 1;
            match field {
                InstanceField::PublishedAt(at) => {
                    assignments.push(format!("published_at = COALESCE(published_at, ?{n})"));
                    values.push(Some(encode_ts(at)));
                }
                InstanceField::DeletedAt(at) => {
                    assignments.push(format!("deleted_at = ?{n}"));
                    values.push(at.as_ref().map(encode_ts));
                }
            }
        }
        assignments.push(format!("updated_at = ?{}", values.len() + 1));
        values.push(Some(encode_ts(&Utc::now())));
        let id_param = values.len() + 1;
        values.push(Some(id.to_string()));

        let sql = format!(
            "UPDATE instances SET {} WHERE id = ?{}",
            assignments.join(", "),
            id_param
        );

        let conn = self.lock_conn()?;
        let rows = conn.execute(&sql, params_from_iter(values.iter()))?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

impl PublishedInstances for SqliteStore {
    fn published_instances(&self) -> StoreResult<Vec<InstanceInfo>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT i.id, i.host, i.published_at,
                    m.instance_id, m.name, m.description, m.icon_url,
                    m.software_name, m.software_version, m.extra_json, m.updated_at
             FROM instances i
             LEFT JOIN metas m ON m.instance_id = i.id
             WHERE i.published_at IS NOT NULL AND i.deleted_at IS NULL
             ORDER BY i.host",
        )?;

        let rows = stmt.query_map([], InfoRow::from_row)?;

        let mut infos = Vec::new();
        for row in rows {
            infos.push(row?.decode()?);
        }

        Ok(infos)
    }
}

impl Repository<PushSubscription> for SqliteStore {
    fn create(&self, subscription: &PushSubscription) -> StoreResult<PushSubscription> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO push_subscriptions
                 (id, provider_type, acct, client_account_id, instance_uri, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                subscription.id.to_string(),
                subscription.provider_type,
                subscription.acct,
                subscription.client_account_id.to_string(),
                subscription.instance_uri,
                encode_ts(&subscription.created_at),
                encode_ts(&subscription.updated_at),
            ],
        )?;

        debug!(
            "Created push subscription {} ({})",
            subscription.id, subscription.provider_type
        );
        Self::find_subscription(&conn, &SubscriptionCriteria::Id(subscription.id))
    }

    fn find_one(&self, criteria: &SubscriptionCriteria) -> StoreResult<PushSubscription> {
        let conn = self.lock_conn()?;
        Self::find_subscription(&conn, criteria)
    }

    fn update_fields(&self, id: &Uuid, fields: &[SubscriptionField]) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        let now = encode_ts(&Utc::now());

        for field in fields {
            let rows = match field {
                SubscriptionField::ProviderType(provider_type) => conn.execute(
                    "UPDATE push_subscriptions SET provider_type = ?1, updated_at = ?2
                     WHERE id = ?3",
                    params![provider_type, now, id.to_string()],
                )?,
            };
            if rows == 0 {
                return Err(StoreError::NotFound);
            }
        }
        Ok(())
    }
}

// ========================================
// Row decoding
// ========================================

struct InstanceRow {
    id: String,
    host: String,
    published_at: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl InstanceRow {
    const COLUMNS: &'static str = "id, host, published_at, created_at, updated_at, deleted_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            host: row.get(1)?,
            published_at: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            deleted_at: row.get(5)?,
        })
    }

    fn decode(self) -> StoreResult<Instance> {
        Ok(Instance {
            id: decode_uuid("instances.id", &self.id)?,
            host: self.host,
            publication: Publication::from_published_at(decode_opt_ts(
                "instances.published_at",
                self.published_at.as_deref(),
            )?),
            created_at: decode_ts("instances.created_at", &self.created_at)?,
            updated_at: decode_ts("instances.updated_at", &self.updated_at)?,
            deleted_at: decode_opt_ts("instances.deleted_at", self.deleted_at.as_deref())?,
        })
    }
}

struct InfoRow {
    id: String,
    host: String,
    published_at: String,
    meta_instance_id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    icon_url: Option<String>,
    software_name: Option<String>,
    software_version: Option<String>,
    extra_json: Option<String>,
    meta_updated_at: Option<String>,
}

impl InfoRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            host: row.get(1)?,
            published_at: row.get(2)?,
            meta_instance_id: row.get(3)?,
            name: row.get(4)?,
            description: row.get(5)?,
            icon_url: row.get(6)?,
            software_name: row.get(7)?,
            software_version: row.get(8)?,
            extra_json: row.get(9)?,
            meta_updated_at: row.get(10)?,
        })
    }

    fn decode(self) -> StoreResult<InstanceInfo> {
        let meta = match self.meta_instance_id {
            Some(instance_id) => Some(InstanceMeta {
                instance_id: decode_uuid("metas.instance_id", &instance_id)?,
                name: self.name,
                description: self.description,
                icon_url: self.icon_url,
                software_name: self.software_name,
                software_version: self.software_version,
                extra: decode_json(
                    "metas.extra_json",
                    self.extra_json.as_deref().unwrap_or("{}"),
                )?,
                updated_at: decode_ts(
                    "metas.updated_at",
                    self.meta_updated_at.as_deref().unwrap_or_default(),
                )?,
            }),
            None => None,
        };

        Ok(InstanceInfo {
            id: decode_uuid("instances.id", &self.id)?,
            host: self.host,
            published_at: decode_ts("instances.published_at", &self.published_at)?,
            meta,
        })
    }
}

struct SubscriptionRow {
    id: String,
    provider_type: String,
    acct: String,
    client_account_id: String,
    instance_uri: String,
    created_at: String,
    updated_at: String,
}

impl SubscriptionRow {
    const COLUMNS: &'static str =
        "id, provider_type, acct, client_account_id, instance_uri, created_at, updated_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            provider_type: row.get(1)?,
            acct: row.get(2)?,
            client_account_id: row.get(3)?,
            instance_uri: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn decode(self) -> StoreResult<PushSubscription> {
        Ok(PushSubscription {
            id: decode_uuid("push_subscriptions.id", &self.id)?,
            provider_type: self.provider_type,
            acct: self.acct,
            client_account_id: decode_uuid(
                "push_subscriptions.client_account_id",
                &self.client_account_id,
            )?,
            instance_uri: self.instance_uri,
            created_at: decode_ts("push_subscriptions.created_at", &self.created_at)?,
            updated_at: decode_ts("push_subscriptions.updated_at", &self.updated_at)?,
        })
    }
}

// Fixed-width UTC timestamps keep text ordering equal to time ordering.
fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_ts(column: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            column: column.to_string(),
            message: format!("{value:?}: {e}"),
        })
}

fn decode_opt_ts(column: &str, value: Option<&str>) -> StoreResult<Option<DateTime<Utc>>> {
    value.map(|v| decode_ts(column, v)).transpose()
}

fn decode_json(column: &str, value: &str) -> StoreResult<serde_json::Value> {
    serde_json::from_str(value).map_err(|e| StoreError::Corrupt {
        column: column.to_string(),
        message: e.to_string(),
    })
}

fn decode_uuid(column: &str, value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt {
        column: column.to_string(),
        message: format!("{value:?}: {e}"),
    })
}
