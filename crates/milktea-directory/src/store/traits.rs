//! Store backend traits.

use crate::error::StoreResult;
use crate::model::InstanceInfo;

/// A record type a [`Repository`] can persist.
pub trait Entity: Sized {
    /// Human-readable name used in error messages.
    const NAME: &'static str;
    /// Primary key type.
    type Id;
    /// Lookup criteria accepted by [`Repository::find_one`].
    type Criteria;
    /// Named columns accepted by [`Repository::update_fields`].
    type Field;
}

/// Row-level persistence for one entity type.
///
/// Each call is a single atomic operation. Uniqueness is enforced by the
/// backend and reported as [`StoreError::UniqueViolation`]; callers rely on
/// that signal rather than checking first.
///
/// [`StoreError::UniqueViolation`]: crate::error::StoreError::UniqueViolation
pub trait Repository<E: Entity>: Send + Sync {
    /// Insert a new row and return it as stored.
    fn create(&self, entity: &E) -> StoreResult<E>;

    /// Fetch the row matching `criteria`.
    ///
    /// Returns [`StoreError::NotFound`](crate::error::StoreError::NotFound)
    /// when nothing matches.
    fn find_one(&self, criteria: &E::Criteria) -> StoreResult<E>;

    /// Update only the given columns of row `id`, bumping `updated_at`.
    fn update_fields(&self, id: &E::Id, fields: &[E::Field]) -> StoreResult<()>;
}

/// The published-instance listing query.
pub trait PublishedInstances: Send + Sync {
    /// Instances with a publication timestamp and no deletion marker, each
    /// outer-joined with its metadata row.
    fn published_instances(&self) -> StoreResult<Vec<InstanceInfo>>;
}
