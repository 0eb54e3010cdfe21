use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, DatabaseConnection, EntityTrait, PaginatorTrait, SqlErr,
};

use crate::entity::customer_group::{ActiveModel, Entity as CustomerGroup, Model};
use crate::platform::GroupRecord;

use super::UpsertOutcome;
use super::errors::{RepositoryError, Result};

/// Find a group by `chat_id`.
pub async fn find_by_chat_id(db: &DatabaseConnection, chat_id: &str) -> Result<Option<Model>> {
    CustomerGroup::find_by_id(chat_id.to_string())
        .one(db)
        .await
        .map_err(RepositoryError::from)
}

/// Insert or update a group, stamping `updated_at = now`.
pub async fn upsert(
    db: &DatabaseConnection,
    record: &GroupRecord,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    if record.chat_id.is_empty() {
        return Err(RepositoryError::invalid_input(
            "group record has an empty chat_id",
        ));
    }

    if find_by_chat_id(db, &record.chat_id).await?.is_some() {
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

/// Count group rows.
pub async fn count(db: &DatabaseConnection) -> Result<u64> {
    CustomerGroup::find()
        .count(db)
        .await
        .map_err(RepositoryError::from)
}
