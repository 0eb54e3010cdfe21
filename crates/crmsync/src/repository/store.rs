use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use crate::platform::{EntityId, EntityRecord};

use super::errors::Result;
use super::{customer, group, sync_state};

/// Result of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the id.
    Inserted,
    /// An existing row was overwritten.
    Updated,
}

/// Local mirror of remote entities.
///
/// `exists`, `known_ids` and `stale_ids` look at customers, the only kind synced
/// incrementally. `upsert` must be idempotent: writing the same record twice
/// yields `Updated` the second time and leaves the row unchanged apart from
/// its sync timestamp.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Whether a customer with this id has been stored before.
    async fn exists(&self, id: &EntityId) -> Result<bool>;

    /// Every stored customer id, loaded in one query.
    async fn known_ids(&self) -> Result<HashSet<EntityId>>;

    /// Insert or update a record.
    async fn upsert(&self, record: &EntityRecord) -> Result<UpsertOutcome>;

    /// Customer ids whose last sync is older than `threshold` or unknown.
    async fn stale_ids(&self, threshold: DateTime<Utc>) -> Result<HashSet<EntityId>>;

    /// When the last completed customer sync finished.
    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>>;

    /// Record the completion time of a customer sync.
    async fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()>;
}

/// [`EntityStore`] backed by a sea-orm connection.
#[derive(Debug)]
pub struct DbStore {
    db: DatabaseConnection,
}

impl DbStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl EntityStore for DbStore {
    async fn exists(&self, id: &EntityId) -> Result<bool> {
        customer::exists(&self.db, id).await
    }

    async fn known_ids(&self) -> Result<HashSet<EntityId>> {
        customer::all_ids(&self.db).await
    }

    async fn upsert(&self, record: &EntityRecord) -> Result<UpsertOutcome> {
        let now = Utc::now();
        match record {
            EntityRecord::Customer(c) => customer::upsert(&self.db, c, now).await,
            EntityRecord::Group(g) => group::upsert(&self.db, g, now).await,
        }
    }

    async fn stale_ids(&self, threshold: DateTime<Utc>) -> Result<HashSet<EntityId>> {
        customer::stale_ids(&self.db, threshold).await
    }

    async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        sync_state::last_customer_sync_time(&self.db).await
    }

    async fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        sync_state::set_last_customer_sync_time(&self.db, at).await
    }
}
