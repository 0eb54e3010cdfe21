//! Initial migration creating the customer, group and sync-state tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_customers(manager).await?;
        self.create_customer_groups(manager).await?;
        self.create_sync_state(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncState::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CustomerGroups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Customers::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_customers(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Customers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Customers::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    // Profile
                    .col(ColumnDef::new(Customers::Name).string().not_null())
                    .col(ColumnDef::new(Customers::Avatar).text().null())
                    .col(
                        ColumnDef::new(Customers::Gender)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Customers::CustomerType)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(Customers::CorpName).string().null())
                    .col(ColumnDef::new(Customers::Position).string().null())
                    .col(ColumnDef::new(Customers::Unionid).string().null())
                    // Ownership
                    .col(ColumnDef::new(Customers::OwnerUserid).string().null())
                    .col(ColumnDef::new(Customers::OwnerName).string().null())
                    // Follow-user fields
                    .col(ColumnDef::new(Customers::Remark).string().null())
                    .col(ColumnDef::new(Customers::Description).text().null())
                    .col(
                        ColumnDef::new(Customers::AddTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Customers::AddWay).integer().null())
                    .col(ColumnDef::new(Customers::State).string().null())
                    .col(
                        ColumnDef::new(Customers::RemarkMobiles)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(ColumnDef::new(Customers::RemarkCorpName).string().null())
                    // Tags
                    .col(
                        ColumnDef::new(Customers::Tags)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(
                        ColumnDef::new(Customers::EnterpriseTags)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(
                        ColumnDef::new(Customers::PersonalTags)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(
                        ColumnDef::new(Customers::RuleTags)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    // Tracking
                    .col(
                        ColumnDef::new(Customers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Customers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Staleness scans filter on updated_at
        manager
            .create_index(
                Index::create()
                    .name("idx_customers_updated_at")
                    .table(Customers::Table)
                    .col(Customers::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customers_owner")
                    .table(Customers::Table)
                    .col(Customers::OwnerUserid)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_customer_groups(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CustomerGroups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CustomerGroups::ChatId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CustomerGroups::Name).string().not_null())
                    .col(ColumnDef::new(CustomerGroups::OwnerUserid).string().null())
                    .col(ColumnDef::new(CustomerGroups::OwnerName).string().null())
                    .col(ColumnDef::new(CustomerGroups::Notice).text().null())
                    .col(
                        ColumnDef::new(CustomerGroups::AdminList)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(
                        ColumnDef::new(CustomerGroups::MemberCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CustomerGroups::ExternalMemberCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CustomerGroups::InternalMemberCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CustomerGroups::GroupType)
                            .string()
                            .not_null()
                            .default("internal"),
                    )
                    .col(ColumnDef::new(CustomerGroups::Version).string().null())
                    .col(
                        ColumnDef::new(CustomerGroups::GroupCreateTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CustomerGroups::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CustomerGroups::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customer_groups_owner")
                    .table(CustomerGroups::Table)
                    .col(CustomerGroups::OwnerUserid)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_state(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncState::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncState::Value).text().not_null())
                    .col(
                        ColumnDef::new(SyncState::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "customers")]
enum Customers {
    Table,
    Id,
    Name,
    Avatar,
    Gender,
    CustomerType,
    CorpName,
    Position,
    Unionid,
    OwnerUserid,
    OwnerName,
    Remark,
    Description,
    AddTime,
    AddWay,
    State,
    RemarkMobiles,
    RemarkCorpName,
    Tags,
    EnterpriseTags,
    PersonalTags,
    RuleTags,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "customer_groups")]
enum CustomerGroups {
    Table,
    ChatId,
    Name,
    OwnerUserid,
    OwnerName,
    Notice,
    AdminList,
    MemberCount,
    ExternalMemberCount,
    InternalMemberCount,
    GroupType,
    Version,
    GroupCreateTime,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_state")]
enum SyncState {
    Table,
    Key,
    Value,
    UpdatedAt,
}
