//! WeCom response bodies.
//!
//! Every response is an [`Envelope`] around an endpoint-specific body. Body
//! fields all default so error responses (which carry only `errcode` and
//! `errmsg`) still parse.

use serde::Deserialize;

use crate::platform::{CustomerDetail, GroupDetail};

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenBody {
    pub access_token: String,
    /// Seconds.
    pub expires_in: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WeComUser {
    pub userid: String,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserListBody {
    pub userlist: Vec<WeComUser>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExternalContactListBody {
    pub external_userid: Vec<String>,
}

/// `externalcontact/get` returns the detail fields at the top level.
pub type ExternalContactBody = CustomerDetail;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupChatListItem {
    pub chat_id: String,
    pub status: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupChatListBody {
    pub group_chat_list: Vec<GroupChatListItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupChatBody {
    pub group_chat: GroupDetail,
}
