use chrono::{DateTime, Utc};
use sea_orm::Set;

use crate::entity::customer::ActiveModel as CustomerActiveModel;
use crate::entity::customer_group::ActiveModel as CustomerGroupActiveModel;
use crate::entity::group_type::GroupType;

use super::types::{
    CustomerDetail, CustomerRecord, FollowTag, GroupDetail, GroupRecord, Owner, TagKind, TagRef,
};

/// Member type of external contacts in `member_list[].type`.
const EXTERNAL_MEMBER: i32 = 2;
/// Member type of internal staff in `member_list[].type`.
const INTERNAL_MEMBER: i32 = 1;

/// Convert vendor unix seconds into a timestamp; `0` means "not reported".
fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

/// Treat empty strings from the vendor as absent.
fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|s| !s.is_empty()).map(str::to_string)
}

impl From<&FollowTag> for TagRef {
    fn from(tag: &FollowTag) -> Self {
        Self {
            tag_id: tag.tag_id.clone().unwrap_or_default(),
            tag_name: tag.tag_name.clone(),
            group_name: tag.group_name.clone().unwrap_or_default(),
        }
    }
}

impl CustomerRecord {
    /// Build a store record from a detail payload.
    ///
    /// `owner` is the staff member the id was enumerated under. Its follow-user
    /// entry supplies remark, add time, tags and the other per-owner fields;
    /// when the payload carries no entry for that owner those fields stay empty.
    pub fn from_detail(detail: &CustomerDetail, owner: Option<&Owner>) -> Self {
        let contact = &detail.external_contact;
        let follow = owner.and_then(|o| detail.follow_user.iter().find(|f| f.userid == o.userid));

        let mut record = Self {
            id: contact.external_userid.clone(),
            name: contact.name.clone(),
            avatar: non_empty(&contact.avatar),
            gender: contact.gender,
            customer_type: if contact.contact_type == 0 {
                1
            } else {
                contact.contact_type
            },
            corp_name: non_empty(&contact.corp_name),
            position: non_empty(&contact.position),
            unionid: non_empty(&contact.unionid),
            owner_userid: owner.map(|o| o.userid.clone()),
            owner_name: owner.map(|o| o.name.clone()),
            remark: None,
            description: None,
            add_time: None,
            add_way: None,
            state: None,
            remark_mobiles: Vec::new(),
            remark_corp_name: None,
            tags: Vec::new(),
            enterprise_tags: Vec::new(),
            personal_tags: Vec::new(),
            rule_tags: Vec::new(),
        };

        if let Some(follow) = follow {
            record.remark = non_empty(&follow.remark);
            record.description = non_empty(&follow.description);
            record.add_time = from_unix(follow.createtime);
            record.add_way = follow.add_way;
            record.state = non_empty(&follow.state);
            record.remark_mobiles = follow.remark_mobiles.clone();
            record.remark_corp_name = non_empty(&follow.remark_corp_name);
            record.tags = follow.tags.iter().map(|t| t.tag_name.clone()).collect();

            for tag in &follow.tags {
                match tag.kind() {
                    TagKind::Enterprise => record.enterprise_tags.push(tag.into()),
                    TagKind::Personal => record.personal_tags.push(tag.into()),
                    TagKind::Rule => record.rule_tags.push(tag.into()),
                    TagKind::Other(_) => {}
                }
            }
        }

        record
    }

    /// Convert to an active model stamped with `now` as both creation and sync time.
    ///
    /// Callers updating an existing row should reset `created_at` to `NotSet`.
    pub fn to_active_model(&self, now: DateTime<Utc>) -> CustomerActiveModel {
        let now = now.fixed_offset();
        CustomerActiveModel {
            id: Set(self.id.clone()),
            name: Set(self.name.clone()),
            avatar: Set(self.avatar.clone()),
            gender: Set(self.gender),
            customer_type: Set(self.customer_type),
            corp_name: Set(self.corp_name.clone()),
            position: Set(self.position.clone()),
            unionid: Set(self.unionid.clone()),
            owner_userid: Set(self.owner_userid.clone()),
            owner_name: Set(self.owner_name.clone()),
            remark: Set(self.remark.clone()),
            description: Set(self.description.clone()),
            add_time: Set(self.add_time.map(|t| t.fixed_offset())),
            add_way: Set(self.add_way),
            state: Set(self.state.clone()),
            remark_mobiles: Set(serde_json::json!(self.remark_mobiles)),
            remark_corp_name: Set(self.remark_corp_name.clone()),
            tags: Set(serde_json::json!(self.tags)),
            enterprise_tags: Set(serde_json::json!(self.enterprise_tags)),
            personal_tags: Set(serde_json::json!(self.personal_tags)),
            rule_tags: Set(serde_json::json!(self.rule_tags)),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
    }
}

impl GroupRecord {
    /// Build a store record from a group detail payload.
    pub fn from_detail(detail: &GroupDetail) -> Self {
        let external = detail
            .member_list
            .iter()
            .filter(|m| m.member_type == EXTERNAL_MEMBER)
            .count();
        let internal = detail
            .member_list
            .iter()
            .filter(|m| m.member_type == INTERNAL_MEMBER)
            .count();

        let owner_userid = non_empty(&detail.owner);
        let owner_name = owner_userid.as_deref().and_then(|owner| {
            detail
                .member_list
                .iter()
                .find(|m| m.userid == owner)
                .and_then(|m| non_empty(&m.name))
        });

        Self {
            chat_id: detail.chat_id.clone(),
            name: detail.name.clone(),
            owner_userid,
            owner_name,
            notice: non_empty(&detail.notice),
            admin_list: detail
                .admin_list
                .iter()
                .map(|a| a.userid().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            member_count: detail.member_list.len() as i32,
            external_member_count: external as i32,
            internal_member_count: internal as i32,
            group_type: if external > 0 {
                GroupType::External
            } else {
                GroupType::Internal
            },
            version: non_empty(&detail.member_version),
            group_create_time: from_unix(detail.create_time),
        }
    }

    /// Convert to an active model stamped with `now`.
    pub fn to_active_model(&self, now: DateTime<Utc>) -> CustomerGroupActiveModel {
        let now = now.fixed_offset();
        CustomerGroupActiveModel {
            chat_id: Set(self.chat_id.clone()),
            name: Set(self.name.clone()),
            owner_userid: Set(self.owner_userid.clone()),
            owner_name: Set(self.owner_name.clone()),
            notice: Set(self.notice.clone()),
            admin_list: Set(serde_json::json!(self.admin_list)),
            member_count: Set(self.member_count),
            external_member_count: Set(self.external_member_count),
            internal_member_count: Set(self.internal_member_count),
            group_type: Set(self.group_type),
            version: Set(self.version.clone()),
            group_create_time: Set(self.group_create_time.map(|t| t.fixed_offset())),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::types::{ExternalContact, FollowUser, GroupAdmin, GroupMember};

    fn tag(name: &str, tag_type: i32) -> FollowTag {
        FollowTag {
            group_name: Some("region".to_string()),
            tag_name: name.to_string(),
            tag_id: Some(format!("et_{name}")),
            tag_type,
        }
    }

    fn detail_with_two_followers() -> CustomerDetail {
        CustomerDetail {
            external_contact: ExternalContact {
                external_userid: "wm_1".to_string(),
                name: "Alice".to_string(),
                contact_type: 1,
                gender: 2,
                corp_name: Some(String::new()),
                ..Default::default()
            },
            follow_user: vec![
                FollowUser {
                    userid: "other".to_string(),
                    remark: Some("not me".to_string()),
                    ..Default::default()
                },
                FollowUser {
                    userid: "zhangsan".to_string(),
                    remark: Some("key account".to_string()),
                    createtime: 1_700_000_000,
                    tags: vec![tag("vip", 1), tag("friend", 2), tag("auto", 3), tag("x", 9)],
                    remark_mobiles: vec!["13800000000".to_string()],
                    add_way: Some(1),
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn customer_uses_follow_entry_of_owner() {
        let owner = Owner::new("zhangsan", "Zhang San");
        let record = CustomerRecord::from_detail(&detail_with_two_followers(), Some(&owner));

        assert_eq!(record.id, "wm_1");
        assert_eq!(record.owner_userid.as_deref(), Some("zhangsan"));
        assert_eq!(record.owner_name.as_deref(), Some("Zhang San"));
        assert_eq!(record.remark.as_deref(), Some("key account"));
        assert_eq!(record.add_time, DateTime::from_timestamp(1_700_000_000, 0));
        assert_eq!(record.remark_mobiles, vec!["13800000000"]);
        assert_eq!(record.tags, vec!["vip", "friend", "auto", "x"]);
        assert_eq!(record.enterprise_tags.len(), 1);
        assert_eq!(record.enterprise_tags[0].tag_id, "et_vip");
        assert_eq!(record.personal_tags[0].tag_name, "friend");
        assert_eq!(record.rule_tags[0].group_name, "region");
        assert!(record.corp_name.is_none(), "empty strings become None");
    }

    #[test]
    fn customer_without_matching_follow_entry_keeps_owner_only() {
        let owner = Owner::new("lisi", "Li Si");
        let record = CustomerRecord::from_detail(&detail_with_two_followers(), Some(&owner));

        assert_eq!(record.owner_userid.as_deref(), Some("lisi"));
        assert!(record.remark.is_none());
        assert!(record.tags.is_empty());
        assert!(record.add_time.is_none());
    }

    #[test]
    fn customer_active_model_sets_sync_time() {
        let now = Utc::now();
        let record = CustomerRecord::from_detail(&detail_with_two_followers(), None);
        let model = record.to_active_model(now);

        assert_eq!(model.updated_at.clone().unwrap(), Some(now.fixed_offset()));
        assert_eq!(model.tags.clone().unwrap(), serde_json::json!([]));
    }

    #[test]
    fn group_counts_members_and_resolves_owner_name() {
        let detail = GroupDetail {
            chat_id: "wr_1".to_string(),
            name: "Buyers".to_string(),
            owner: Some("zhangsan".to_string()),
            create_time: 1_700_000_000,
            member_list: vec![
                GroupMember {
                    userid: "zhangsan".to_string(),
                    member_type: 1,
                    name: Some("Zhang San".to_string()),
                    join_time: 0,
                },
                GroupMember {
                    userid: "wm_1".to_string(),
                    member_type: 2,
                    ..Default::default()
                },
                GroupMember {
                    userid: "wm_2".to_string(),
                    member_type: 2,
                    ..Default::default()
                },
            ],
            admin_list: vec![
                GroupAdmin::Member {
                    userid: "lisi".to_string(),
                },
                GroupAdmin::Userid("wangwu".to_string()),
            ],
            ..Default::default()
        };

        let record = GroupRecord::from_detail(&detail);
        assert_eq!(record.member_count, 3);
        assert_eq!(record.external_member_count, 2);
        assert_eq!(record.internal_member_count, 1);
        assert_eq!(record.group_type, GroupType::External);
        assert_eq!(record.owner_name.as_deref(), Some("Zhang San"));
        assert_eq!(record.admin_list, vec!["lisi", "wangwu"]);
    }

    #[test]
    fn group_with_only_staff_is_internal() {
        let detail = GroupDetail {
            chat_id: "wr_2".to_string(),
            member_list: vec![GroupMember {
                userid: "zhangsan".to_string(),
                member_type: 1,
                ..Default::default()
            }],
            ..Default::default()
        };
        let record = GroupRecord::from_detail(&detail);
        assert_eq!(record.group_type, GroupType::Internal);
        assert!(record.owner_userid.is_none());
        assert!(record.group_create_time.is_none());
    }

    #[test]
    fn admin_list_deserializes_both_shapes() {
        let admins: Vec<GroupAdmin> =
            serde_json::from_str(r#"[{"userid":"a"},"b"]"#).expect("valid admin list");
        let ids: Vec<&str> = admins.iter().map(GroupAdmin::userid).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
