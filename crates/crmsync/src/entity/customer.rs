//! Customer entity - one row per external contact mirrored from WeCom.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Customer model, keyed by the vendor's `external_userid`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    /// Remote identifier (`external_userid`).
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    // ─── Profile ─────────────────────────────────────────────────────────────
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub avatar: Option<String>,
    /// 0 unknown, 1 male, 2 female.
    pub gender: i32,
    /// 1 personal WeChat user, 2 WeCom user.
    pub customer_type: i32,
    pub corp_name: Option<String>,
    pub position: Option<String>,
    pub unionid: Option<String>,

    // ─── Ownership ───────────────────────────────────────────────────────────
    /// Userid of the staff member the contact was enumerated under.
    pub owner_userid: Option<String>,
    pub owner_name: Option<String>,

    // ─── Follow-user fields ──────────────────────────────────────────────────
    pub remark: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub add_time: Option<DateTimeWithTimeZone>,
    pub add_way: Option<i32>,
    pub state: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub remark_mobiles: serde_json::Value,
    pub remark_corp_name: Option<String>,

    // ─── Tags (JSON arrays of tag names) ─────────────────────────────────────
    #[sea_orm(column_type = "Json")]
    pub tags: serde_json::Value,
    #[sea_orm(column_type = "Json")]
    pub enterprise_tags: serde_json::Value,
    #[sea_orm(column_type = "Json")]
    pub personal_tags: serde_json::Value,
    #[sea_orm(column_type = "Json")]
    pub rule_tags: serde_json::Value,

    // ─── Tracking ────────────────────────────────────────────────────────────
    pub created_at: DateTimeWithTimeZone,
    /// Last successful sync of this row. Rows with `NULL` count as stale.
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Tag names as plain strings, ignoring malformed JSON entries.
    pub fn tag_names(&self) -> Vec<String> {
        self.tags
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
