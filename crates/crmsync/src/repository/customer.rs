use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QuerySelect, SqlErr,
};

use crate::entity::customer::{ActiveModel, Column, Entity as Customer, Model};
use crate::platform::CustomerRecord;

use super::UpsertOutcome;
use super::errors::{RepositoryError, Result};

/// Find a customer by its remote identifier.
pub async fn find_by_id(db: &DatabaseConnection, id: &str) -> Result<Option<Model>> {
    Customer::find_by_id(id.to_string())
        .one(db)
        .await
        .map_err(RepositoryError::from)
}

/// Check whether a customer row exists.
pub async fn exists(db: &DatabaseConnection, id: &str) -> Result<bool> {
    let n = Customer::find_by_id(id.to_string()).count(db).await?;
    Ok(n > 0)
}

/// Insert or update a customer, stamping `updated_at = now`.
///
/// `created_at` is only written on insert. Two workers racing to insert the
/// same id (the contact is followed by several owners) resolve to one insert
/// and one update.
pub async fn upsert(
    db: &DatabaseConnection,
    record: &CustomerRecord,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    if record.id.is_empty() {
        return Err(RepositoryError::invalid_input(
            "customer record has an empty external_userid",
        ));
    }

    if find_by_id(db, &record.id).await?.is_some() {
        update_existing(db, record.to_active_model(now)).await?;
        return Ok(UpsertOutcome::Updated);
    }

    match record.to_active_model(now).insert(db).await {
        Ok(_) => Ok(UpsertOutcome::Inserted),
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            update_existing(db, record.to_active_model(now)).await?;
            Ok(UpsertOutcome::Updated)
        }
        Err(e) => Err(e.into()),
    }
}

async fn update_existing(db: &DatabaseConnection, mut model: ActiveModel) -> Result<Model> {
    model.created_at = ActiveValue::NotSet;
    model.update(db).await.map_err(RepositoryError::from)
}

/// Ids of customers last synced before `threshold`, or never stamped.
pub async fn stale_ids(
    db: &DatabaseConnection,
    threshold: DateTime<Utc>,
) -> Result<HashSet<String>> {
    let ids: Vec<String> = Customer::find()
        .select_only()
        .column(Column::Id)
        .filter(
            Condition::any()
                .add(Column::UpdatedAt.is_null())
                .add(Column::UpdatedAt.lt(threshold.fixed_offset())),
        )
        .into_tuple()
        .all(db)
        .await?;
    Ok(ids.into_iter().collect())
}

/// Ids of every stored customer.
pub async fn all_ids(db: &DatabaseConnection) -> Result<HashSet<String>> {
    let ids: Vec<String> = Customer::find()
        .select_only()
        .column(Column::Id)
        .into_tuple()
        .all(db)
        .await?;
    Ok(ids.into_iter().collect())
}

/// Count customer rows.
pub async fn count(db: &DatabaseConnection) -> Result<u64> {
    Customer::find()
        .count(db)
        .await
        .map_err(RepositoryError::from)
}
