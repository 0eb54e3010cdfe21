use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::group_type::GroupType;

use super::errors::Result;

/// Remote identifier of a customer (`external_userid`) or group (`chat_id`).
pub type EntityId = String;

/// A staff member whose external contacts are enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub userid: String,
    /// Display name, carried into the customer row as `owner_name`.
    pub name: String,
}

impl Owner {
    pub fn new(userid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            userid: userid.into(),
            name: name.into(),
        }
    }
}

// ─── Customer payload ────────────────────────────────────────────────────────

/// Detail payload for one external contact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerDetail {
    pub external_contact: ExternalContact,
    /// One entry per staff member following this contact.
    pub follow_user: Vec<FollowUser>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalContact {
    pub external_userid: String,
    pub name: String,
    pub avatar: Option<String>,
    /// 1 personal WeChat user, 2 WeCom user.
    #[serde(rename = "type")]
    pub contact_type: i32,
    pub gender: i32,
    pub unionid: Option<String>,
    pub position: Option<String>,
    pub corp_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowUser {
    pub userid: String,
    pub remark: Option<String>,
    pub description: Option<String>,
    /// Unix seconds when the staff member added the contact.
    pub createtime: i64,
    pub tags: Vec<FollowTag>,
    pub remark_corp_name: Option<String>,
    pub remark_mobiles: Vec<String>,
    pub add_way: Option<i32>,
    pub state: Option<String>,
}

/// Tag category as reported in `follow_user[].tags[].type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Enterprise,
    Personal,
    Rule,
    Other(i32),
}

impl From<i32> for TagKind {
    fn from(value: i32) -> Self {
        match value {
            1 => Self::Enterprise,
            2 => Self::Personal,
            3 => Self::Rule,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowTag {
    pub group_name: Option<String>,
    pub tag_name: String,
    pub tag_id: Option<String>,
    #[serde(rename = "type")]
    pub tag_type: i32,
}

impl Default for FollowTag {
    fn default() -> Self {
        Self {
            group_name: None,
            tag_name: String::new(),
            tag_id: None,
            tag_type: 1,
        }
    }
}

impl FollowTag {
    #[inline]
    pub fn kind(&self) -> TagKind {
        TagKind::from(self.tag_type)
    }
}

// ─── Group payload ───────────────────────────────────────────────────────────

/// Detail payload for one customer group chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupDetail {
    pub chat_id: String,
    pub name: String,
    /// Userid of the group owner.
    pub owner: Option<String>,
    /// Unix seconds.
    pub create_time: i64,
    pub notice: Option<String>,
    pub member_list: Vec<GroupMember>,
    pub admin_list: Vec<GroupAdmin>,
    pub member_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupMember {
    pub userid: String,
    /// 1 internal staff, 2 external contact.
    #[serde(rename = "type")]
    pub member_type: i32,
    pub name: Option<String>,
    pub join_time: i64,
}

/// Admin entries arrive either as `{"userid": ".."}` objects or bare strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupAdmin {
    Member { userid: String },
    Userid(String),
}

impl GroupAdmin {
    pub fn userid(&self) -> &str {
        match self {
            Self::Member { userid } | Self::Userid(userid) => userid,
        }
    }
}

// ─── Normalized records ──────────────────────────────────────────────────────

/// A tag entry as stored in the categorized tag columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub tag_id: String,
    pub tag_name: String,
    pub group_name: String,
}

/// A customer ready to be written to the local store.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    pub id: EntityId,
    pub name: String,
    pub avatar: Option<String>,
    pub gender: i32,
    pub customer_type: i32,
    pub corp_name: Option<String>,
    pub position: Option<String>,
    pub unionid: Option<String>,
    pub owner_userid: Option<String>,
    pub owner_name: Option<String>,
    pub remark: Option<String>,
    pub description: Option<String>,
    pub add_time: Option<DateTime<Utc>>,
    pub add_way: Option<i32>,
    pub state: Option<String>,
    pub remark_mobiles: Vec<String>,
    pub remark_corp_name: Option<String>,
    /// Names of every tag on the follow-user record.
    pub tags: Vec<String>,
    pub enterprise_tags: Vec<TagRef>,
    pub personal_tags: Vec<TagRef>,
    pub rule_tags: Vec<TagRef>,
}

/// A customer group ready to be written to the local store.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
    pub chat_id: EntityId,
    pub name: String,
    pub owner_userid: Option<String>,
    pub owner_name: Option<String>,
    pub notice: Option<String>,
    pub admin_list: Vec<String>,
    pub member_count: i32,
    pub external_member_count: i32,
    pub internal_member_count: i32,
    pub group_type: GroupType,
    pub version: Option<String>,
    pub group_create_time: Option<DateTime<Utc>>,
}

/// Anything the worker pool can hand to [`crate::repository::EntityStore::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRecord {
    Customer(CustomerRecord),
    Group(GroupRecord),
}

impl EntityRecord {
    /// Remote identifier of the wrapped record.
    pub fn id(&self) -> &str {
        match self {
            Self::Customer(c) => &c.id,
            Self::Group(g) => &g.chat_id,
        }
    }
}

// ─── Capability trait ────────────────────────────────────────────────────────

/// Read-only access to the remote CRM platform.
///
/// Implementations handle pagination and token management internally and
/// convert vendor errors into [`FetchError`](super::FetchError). They should
/// not retry on their own; the sync engine decides what is retryable.
#[async_trait]
pub trait EntityFetcher: Send + Sync {
    /// List every staff member that may own external contacts.
    async fn list_owners(&self) -> Result<Vec<Owner>>;

    /// List the external contact ids followed by `owner`.
    async fn list_entity_ids_for_owner(&self, owner: &Owner) -> Result<Vec<EntityId>>;

    /// Fetch the detail payload of one external contact.
    async fn fetch_customer_detail(&self, id: &EntityId) -> Result<CustomerDetail>;

    /// List every customer group chat id.
    async fn list_group_ids(&self) -> Result<Vec<EntityId>>;

    /// Fetch the detail payload of one group chat.
    async fn fetch_group_detail(&self, id: &EntityId) -> Result<GroupDetail>;
}
