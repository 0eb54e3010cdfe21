//! SyncState entity - small key/value table for orchestrator bookkeeping.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Key under which the last completed incremental (or full) customer sync is stored.
pub const LAST_CUSTOMER_SYNC_TIME: &str = "last_customer_sync_time";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_state")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    /// Stored as RFC 3339 text.
    pub value: String,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
