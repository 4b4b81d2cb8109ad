//! Instance registration and approval.

use crate::error::{DirectoryError, Result, StoreError};
use crate::model::{Instance, InstanceCriteria, InstanceField, InstanceInfo};
use crate::store::{Entity, PublishedInstances, Repository};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const ENTITY: &str = <Instance as Entity>::NAME;

/// Owns the pending → published lifecycle of [`Instance`] records.
pub struct InstanceRegistry<S> {
    store: Arc<S>,
}

impl<S> Clone for InstanceRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> InstanceRegistry<S>
where
    S: Repository<Instance> + PublishedInstances,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Ask for `host` to join the directory.
    ///
    /// Idempotent: an existing record is returned as-is, whatever its
    /// publication state. Otherwise a pending instance is created. When a
    /// concurrent caller inserts the same host first, the create fails on the
    /// unique constraint and the winner's record is returned instead.
    pub fn request(&self, host: &str) -> Result<Instance> {
        let host = normalize_host(host)?;

        if let Some(existing) = self.lookup(&InstanceCriteria::Host(host.to_string()))? {
            return Ok(existing);
        }

        match self.store.create(&Instance::pending(host, Utc::now())) {
            Ok(created) => {
                debug!("Registered pending instance {} ({})", created.host, created.id);
                Ok(created)
            }
            Err(StoreError::UniqueViolation { constraint }) => {
                debug!("Lost registration race for {} on {}", host, constraint);
                match self.lookup(&InstanceCriteria::Host(host.to_string()))? {
                    Some(winner) => Ok(winner),
                    None => {
                        warn!(
                            "Unique violation on {} but no instance found for {}",
                            constraint, host
                        );
                        Err(DirectoryError::Conflict {
                            entity: ENTITY,
                            message: format!("{host} collided on {constraint}"),
                        })
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Publish an instance. Approving a published instance changes nothing.
    pub fn approve(&self, id: Uuid) -> Result<Instance> {
        let instance = self.find_by_id(id)?;
        if instance.is_published() {
            return Ok(instance);
        }
        let Some(at) = instance.publication.publish(Utc::now()).published_at() else {
            return Ok(instance);
        };

        // Set-once column write: a concurrent approval that landed first keeps
        // its timestamp and we read that one back.
        match Repository::<Instance>::update_fields(
            self.store.as_ref(),
            &id,
            &[InstanceField::PublishedAt(at)],
        ) {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(DirectoryError::not_found(ENTITY, id)),
            Err(e) => return Err(e.into()),
        }

        let approved = self.find_by_id(id)?;
        debug!(
            "Approved instance {} at {:?}",
            approved.host,
            approved.published_at()
        );
        Ok(approved)
    }

    /// Every approved, non-deleted instance with its metadata.
    ///
    /// Callers must not rely on the order of the result.
    pub fn list_published(&self) -> Result<Vec<InstanceInfo>> {
        Ok(self.store.published_instances()?)
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Instance> {
        self.lookup(&InstanceCriteria::Id(id))?
            .ok_or_else(|| DirectoryError::not_found(ENTITY, id))
    }

    pub fn find_by_host(&self, host: &str) -> Result<Instance> {
        let host = normalize_host(host)?;
        self.lookup(&InstanceCriteria::Host(host.to_string()))?
            .ok_or_else(|| DirectoryError::not_found(ENTITY, host))
    }

    fn lookup(&self, criteria: &InstanceCriteria) -> Result<Option<Instance>> {
        match self.store.find_one(criteria) {
            Ok(instance) => Ok(Some(instance)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn normalize_host(host: &str) -> Result<&str> {
    let host = host.trim();
    if host.is_empty() {
        return Err(DirectoryError::empty_field("host"));
    }
    Ok(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreResult;
    use crate::model::{InstanceMeta, Publication};
    use crate::store::SqliteStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn create_test_registry() -> (InstanceRegistry<SqliteStore>, Arc<SqliteStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open_in(temp_dir.path()).unwrap());
        (InstanceRegistry::new(Arc::clone(&store)), store, temp_dir)
    }

    /// Hides the first host lookup and slips a competing row in underneath,
    /// the way a concurrent caller would between our lookup and insert.
    struct RacingStore {
        inner: SqliteStore,
        raced: AtomicBool,
        winner_vanishes: bool,
    }

    impl RacingStore {
        fn new(winner_vanishes: bool) -> Self {
            Self {
                inner: SqliteStore::open_in_memory().unwrap(),
                raced: AtomicBool::new(false),
                winner_vanishes,
            }
        }
    }

    impl Repository<Instance> for RacingStore {
        fn create(&self, entity: &Instance) -> StoreResult<Instance> {
            self.inner.create(entity)
        }

        fn find_one(&self, criteria: &InstanceCriteria) -> StoreResult<Instance> {
            if let InstanceCriteria::Host(host) = criteria {
                if !self.raced.swap(true, Ordering::SeqCst) {
                    self.inner.create(&Instance::pending(host.clone(), Utc::now()))?;
                    return Err(StoreError::NotFound);
                }
                if self.winner_vanishes {
                    return Err(StoreError::NotFound);
                }
            }
            self.inner.find_one(criteria)
        }

        fn update_fields(&self, id: &Uuid, fields: &[InstanceField]) -> StoreResult<()> {
            Repository::<Instance>::update_fields(&self.inner, id, fields)
        }
    }

    impl PublishedInstances for RacingStore {
        fn published_instances(&self) -> StoreResult<Vec<InstanceInfo>> {
            self.inner.published_instances()
        }
    }

    /// A store whose every call fails with a backend error.
    struct BrokenStore;

    fn broken() -> StoreError {
        StoreError::Database {
            message: "disk I/O error".to_string(),
            source: None,
        }
    }

    impl Repository<Instance> for BrokenStore {
        fn create(&self, _entity: &Instance) -> StoreResult<Instance> {
            Err(broken())
        }

        fn find_one(&self, _criteria: &InstanceCriteria) -> StoreResult<Instance> {
            Err(broken())
        }

        fn update_fields(&self, _id: &Uuid, _fields: &[InstanceField]) -> StoreResult<()> {
            Err(broken())
        }
    }

    impl PublishedInstances for BrokenStore {
        fn published_instances(&self) -> StoreResult<Vec<InstanceInfo>> {
            Err(broken())
        }
    }

    #[test]
    fn test_request_creates_pending_instance() {
        let (registry, _store, _temp_dir) = create_test_registry();

        let instance = registry.request("mastodon.example").unwrap();
        assert_eq!(instance.host, "mastodon.example");
        assert!(instance.published_at().is_none());
    }

    #[test]
    fn test_request_is_idempotent() {
        let (registry, _store, _temp_dir) = create_test_registry();

        let first = registry.request("mastodon.example").unwrap();
        let second = registry.request("mastodon.example").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first, second);
    }

    #[test]
    fn test_request_trims_host() {
        let (registry, _store, _temp_dir) = create_test_registry();

        let first = registry.request("  mastodon.example ").unwrap();
        let second = registry.request("mastodon.example").unwrap();
        assert_eq!(first.host, "mastodon.example");
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_request_rejects_empty_host() {
        let (registry, _store, _temp_dir) = create_test_registry();

        let err = registry.request("   ").unwrap_err();
        assert!(matches!(err, DirectoryError::Validation { field: "host", .. }));
    }

    #[test]
    fn test_request_does_not_reset_published_instance() {
        let (registry, _store, _temp_dir) = create_test_registry();
        let instance = registry.request("mastodon.example").unwrap();
        let approved = registry.approve(instance.id).unwrap();

        let again = registry.request("mastodon.example").unwrap();
        assert_eq!(again.id, instance.id);
        assert_eq!(again.published_at(), approved.published_at());
    }

    #[test]
    fn test_request_returns_soft_deleted_record_unchanged() {
        let (registry, store, _temp_dir) = create_test_registry();
        let instance = registry.request("gone.example").unwrap();
        Repository::<Instance>::update_fields(
            store.as_ref(),
            &instance.id,
            &[InstanceField::DeletedAt(Some(Utc::now()))],
        )
        .unwrap();

        let again = registry.request("gone.example").unwrap();
        assert_eq!(again.id, instance.id);
        assert!(again.is_deleted());
    }

    #[test]
    fn test_request_recovers_from_lost_race() {
        let store = Arc::new(RacingStore::new(false));
        let registry = InstanceRegistry::new(Arc::clone(&store));

        let instance = registry.request("mastodon.example").unwrap();
        let stored: Instance = store
            .inner
            .find_one(&InstanceCriteria::Host("mastodon.example".into()))
            .unwrap();
        assert_eq!(instance.id, stored.id);
    }

    #[test]
    fn test_request_reports_conflict_when_recovery_read_misses() {
        let store = Arc::new(RacingStore::new(true));
        let registry = InstanceRegistry::new(store);

        let err = registry.request("mastodon.example").unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_request_surfaces_storage_failure() {
        let registry = InstanceRegistry::new(Arc::new(BrokenStore));

        let err = registry.request("mastodon.example").unwrap_err();
        assert!(matches!(err, DirectoryError::Storage { .. }));
    }

    #[test]
    fn test_approve_publishes_instance() {
        let (registry, _store, _temp_dir) = create_test_registry();
        let instance = registry.request("mastodon.example").unwrap();

        let approved = registry.approve(instance.id).unwrap();
        assert_eq!(approved.id, instance.id);
        assert!(approved.is_published());
    }

    #[test]
    fn test_approve_twice_keeps_timestamp() {
        let (registry, _store, _temp_dir) = create_test_registry();
        let instance = registry.request("mastodon.example").unwrap();

        let first = registry.approve(instance.id).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let second = registry.approve(instance.id).unwrap();

        assert!(first.published_at().is_some());
        assert_eq!(first.published_at(), second.published_at());
    }

    #[test]
    fn test_approve_missing_instance_is_not_found() {
        let (registry, store, _temp_dir) = create_test_registry();

        let id = Uuid::new_v4();

        let err = registry.approve(id).unwrap_err();
        assert!(err.is_not_found());
        assert!(registry.find_by_id(id).unwrap_err().is_not_found());
        let stored: StoreResult<Instance> = store.find_one(&InstanceCriteria::Id(id));
        assert!(matches!(stored, Err(StoreError::NotFound)));
        assert_eq!(store.instance_count().unwrap(), 0);
        assert!(store.published_instances().unwrap().is_empty());
    }

    #[test]
    fn test_approve_stamps_current_time() {
        let (registry, _store, _temp_dir) = create_test_registry();
        let instance = registry.request("mastodon.example").unwrap();

        let before = Utc::now();
        let approved = registry.approve(instance.id).unwrap();
        let after = Utc::now();

        let at = approved.published_at().unwrap();
        assert!(before <= at && at <= after);
        assert_eq!(approved.publication, Publication::Published { at });
    }

    #[test]
    fn test_list_published_excludes_pending() {
        let (registry, _store, _temp_dir) = create_test_registry();
        let approved = registry.request("approved.example").unwrap();
        registry.request("pending.example").unwrap();
        registry.approve(approved.id).unwrap();

        let listed = registry.list_published().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, approved.id);
        assert!(listed[0].meta.is_none());
    }

    #[test]
    fn test_list_published_includes_metadata() {
        let (registry, store, _temp_dir) = create_test_registry();
        let instance = registry.request("misskey.example").unwrap();
        registry.approve(instance.id).unwrap();
        let mut meta = InstanceMeta::new(instance.id, Utc::now());
        meta.name = Some("Misskey Example".into());
        store.upsert_meta(&meta).unwrap();

        let listed = registry.list_published().unwrap();
        assert_eq!(
            listed[0].meta.as_ref().and_then(|m| m.name.as_deref()),
            Some("Misskey Example")
        );
    }

    #[test]
    fn test_find_by_host_not_found() {
        let (registry, _store, _temp_dir) = create_test_registry();

        let err = registry.find_by_host("unknown.example").unwrap_err();
        assert!(err.is_not_found());
    }
}
