use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

use crate::entity::sync_state::{ActiveModel, Column, Entity as SyncState, LAST_CUSTOMER_SYNC_TIME};

use super::errors::{RepositoryError, Result};

/// Read a raw value.
pub async fn get(db: &DatabaseConnection, key: &str) -> Result<Option<String>> {
    let row = SyncState::find_by_id(key.to_string()).one(db).await?;
    Ok(row.map(|r| r.value))
}

/// Write a raw value, replacing any previous one.
pub async fn set(db: &DatabaseConnection, key: &str, value: &str, now: DateTime<Utc>) -> Result<()> {
    let model = ActiveModel {
        key: Set(key.to_string()),
        value: Set(value.to_string()),
        updated_at: Set(now.fixed_offset()),
    };
    SyncState::insert(model)
        .on_conflict(
            OnConflict::column(Column::Key)
                .update_columns([Column::Value, Column::UpdatedAt])
                .to_owned(),
        )
        .exec(db)
        .await
        .map_err(RepositoryError::from)?;
    Ok(())
}

/// Time of the last completed customer sync.
///
/// An unparsable stored value is logged and treated as "never synced", so the
/// next incremental run falls back to staleness alone instead of failing.
pub async fn last_customer_sync_time(db: &DatabaseConnection) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = get(db, LAST_CUSTOMER_SYNC_TIME).await? else {
        return Ok(None);
    };
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(t) => Ok(Some(t.with_timezone(&Utc))),
        Err(e) => {
            tracing::warn!(value = %raw, error = %e, "Ignoring unparsable last sync time");
            Ok(None)
        }
    }
}

/// Record `at` as the last completed customer sync.
pub async fn set_last_customer_sync_time(db: &DatabaseConnection, at: DateTime<Utc>) -> Result<()> {
    set(db, LAST_CUSTOMER_SYNC_TIME, &at.to_rfc3339(), Utc::now()).await
}

#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod tests {
    use crate::connect_and_migrate;

    use super::*;

    #[tokio::test]
    async fn last_sync_time_round_trip() {
        let db = connect_and_migrate("sqlite::memory:")
            .await
            .expect("test db should migrate");

        assert!(last_customer_sync_time(&db).await.expect("read").is_none());

        let t = DateTime::parse_from_rfc3339("2025-03-01T08:00:00Z")
            .expect("valid")
            .with_timezone(&Utc);
        set_last_customer_sync_time(&db, t).await.expect("write");
        let later = t + chrono::Duration::hours(1);
        set_last_customer_sync_time(&db, later).await.expect("overwrite");

        assert_eq!(last_customer_sync_time(&db).await.expect("read"), Some(later));
    }

    #[tokio::test]
    async fn garbage_value_reads_as_none() {
        let db = connect_and_migrate("sqlite::memory:")
            .await
            .expect("test db should migrate");
        set(&db, LAST_CUSTOMER_SYNC_TIME, "yesterday-ish", Utc::now())
            .await
            .expect("write");
        assert!(last_customer_sync_time(&db).await.expect("read").is_none());
    }
}
