//! User entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role of a user on the platform, ordered by privilege.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Earns, spends and transfers points.
    #[sea_orm(string_value = "regular")]
    Regular,
    /// Registers users, records purchases and processes redemptions.
    #[sea_orm(string_value = "cashier")]
    Cashier,
    /// Administers users, events, promotions and transactions.
    #[sea_orm(string_value = "manager")]
    Manager,
    /// Unrestricted.
    #[sea_orm(string_value = "superuser")]
    Superuser,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Regular
    }
}

impl UserRole {
    /// Manager or superuser.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        matches!(self, Self::Manager | Self::Superuser)
    }

    /// Cashier or above.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        !matches!(self, Self::Regular)
    }

    /// Lowercase name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Cashier => "cashier",
            Self::Manager => "manager",
            Self::Superuser => "superuser",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// University id, 7-8 lowercase alphanumerics.
    #[sea_orm(unique)]
    pub utorid: String,

    #[sea_orm(unique)]
    pub email: String,

    pub name: String,

    #[sea_orm(nullable)]
    pub birthday: Option<Date>,

    pub role: UserRole,

    /// Point balance, never negative.
    #[sea_orm(default_value = 0)]
    pub points: i32,

    #[sea_orm(default_value = false)]
    pub verified: bool,

    /// Flagged cashiers have their purchases held for review.
    #[sea_orm(default_value = false)]
    pub suspicious: bool,

    #[sea_orm(nullable)]
    pub avatar_url: Option<String>,

    #[sea_orm(nullable)]
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,

    #[sea_orm(nullable)]
    #[serde(skip_serializing)]
    pub reset_expires_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub last_login: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_promotion::Entity")]
    UsedPromotions,

    #[sea_orm(has_many = "super::event_guest::Entity")]
    GuestOf,

    #[sea_orm(has_many = "super::event_organizer::Entity")]
    Organizing,
}

impl Related<super::user_promotion::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UsedPromotions.def()
    }
}

impl Related<super::event_guest::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GuestOf.def()
    }
}

impl Related<super::event_organizer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organizing.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
