//! Point transaction entity (the ledger).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of ledger entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "transfer")]
    Transfer,
    #[sea_orm(string_value = "redemption")]
    Redemption,
    #[sea_orm(string_value = "event")]
    Event,
}

impl TransactionKind {
    /// Kinds whose point effect is withheld or reversed by the suspicious flag.
    #[must_use]
    pub const fn is_reviewable(self) -> bool {
        matches!(self, Self::Purchase | Self::Adjustment | Self::Event)
    }

    /// Kinds for which `related_id` carries meaning.
    #[must_use]
    pub const fn has_related_id(self) -> bool {
        !matches!(self, Self::Purchase)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Adjustment => "adjustment",
            Self::Transfer => "transfer",
            Self::Redemption => "redemption",
            Self::Event => "event",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "point_transaction")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub kind: TransactionKind,

    /// The user whose balance the entry concerns.
    #[sea_orm(indexed)]
    pub utorid: String,

    /// Signed point delta: positive credits, negative debits.
    pub points: i32,

    /// Dollars spent (purchases only).
    #[sea_orm(nullable)]
    pub spent: Option<f64>,

    /// Recipient user id (transfer), source transaction id (adjustment),
    /// processor user id (processed redemption) or event id (event).
    #[sea_orm(nullable)]
    pub related_id: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub remark: Option<String>,

    /// Utorid of the acting user.
    pub created_by: String,

    #[sea_orm(default_value = false)]
    pub suspicious: bool,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// A redemption that a cashier has already finalised.
    #[must_use]
    pub const fn is_processed_redemption(&self) -> bool {
        matches!(self.kind, TransactionKind::Redemption) && self.related_id.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::Utorid",
        to = "super::user::Column::Utorid"
    )]
    User,

    #[sea_orm(has_many = "super::transaction_promotion::Entity")]
    Promotions,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::transaction_promotion::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Promotions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
