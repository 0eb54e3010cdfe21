//! CustomerGroup entity - WeCom customer group chats.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::group_type::GroupType;

/// Customer group model, keyed by `chat_id`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customer_groups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub chat_id: String,

    pub name: String,
    pub owner_userid: Option<String>,
    /// Resolved from the member list when the owner is also a member.
    pub owner_name: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notice: Option<String>,
    /// Userids of the group admins.
    #[sea_orm(column_type = "Json")]
    pub admin_list: serde_json::Value,

    // ─── Membership ──────────────────────────────────────────────────────────
    pub member_count: i32,
    pub external_member_count: i32,
    pub internal_member_count: i32,
    pub group_type: GroupType,

    /// Vendor-side change counter.
    pub version: Option<String>,
    pub group_create_time: Option<DateTimeWithTimeZone>,

    // ─── Tracking ────────────────────────────────────────────────────────────
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
