//! Common re-exports for convenient entity usage.

pub use super::customer::{
    ActiveModel as CustomerActiveModel, Column as CustomerColumn, Entity as Customer,
    Model as CustomerModel,
};
pub use super::customer_group::{
    ActiveModel as CustomerGroupActiveModel, Column as CustomerGroupColumn,
    Entity as CustomerGroup, Model as CustomerGroupModel,
};
pub use super::group_type::GroupType;
pub use super::sync_state::{
    ActiveModel as SyncStateActiveModel, Column as SyncStateColumn, Entity as SyncState,
    LAST_CUSTOMER_SYNC_TIME, Model as SyncStateModel,
};
