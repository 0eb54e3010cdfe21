//! Group chat classification.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Whether a customer group has any external members.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum GroupType {
    /// At least one member joined from outside the enterprise.
    #[sea_orm(string_value = "external")]
    External,
    #[sea_orm(string_value = "internal")]
    #[default]
    Internal,
}

impl std::fmt::Display for GroupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupType::External => write!(f, "external"),
            GroupType::Internal => write!(f, "internal"),
        }
    }
}
