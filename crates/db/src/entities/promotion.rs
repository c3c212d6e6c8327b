//! Promotion entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How a promotion is applied to purchases.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum PromotionKind {
    /// Applies to every qualifying purchase.
    #[sea_orm(string_value = "automatic")]
    #[serde(rename = "automatic")]
    Automatic,
    /// Must be cited explicitly and can be used once per user.
    #[sea_orm(string_value = "one-time")]
    #[serde(rename = "one-time")]
    OneTime,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promotion")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub kind: PromotionKind,

    pub start_time: DateTimeWithTimeZone,

    pub end_time: DateTimeWithTimeZone,

    /// Minimum spend in dollars for the promotion to apply.
    #[sea_orm(nullable)]
    pub min_spending: Option<f64>,

    /// Extra points per dollar spent (already divided down from the wire value).
    #[sea_orm(nullable)]
    pub rate: Option<f64>,

    /// Flat bonus points.
    #[sea_orm(nullable)]
    pub points: Option<i32>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether `now` lies inside `[start_time, end_time]`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTimeWithTimeZone) -> bool {
        self.start_time <= now && now <= self.end_time
    }

    /// Whether a purchase of `spent` dollars reaches the minimum spend.
    #[must_use]
    pub fn accepts_spend(&self, spent: f64) -> bool {
        self.min_spending.is_none_or(|min| min <= spent)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_promotion::Entity")]
    UsedBy,

    #[sea_orm(has_many = "super::transaction_promotion::Entity")]
    Transactions,
}

impl Related<super::user_promotion::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UsedBy.def()
    }
}

impl Related<super::transaction_promotion::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
