//! Event entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "event")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub location: String,

    pub start_time: DateTimeWithTimeZone,

    pub end_time: DateTimeWithTimeZone,

    /// Maximum number of guests. NULL = unlimited.
    #[sea_orm(nullable)]
    pub capacity: Option<i32>,

    /// `capacity - guests`, NULL when capacity is unlimited.
    #[sea_orm(nullable)]
    pub space_remain: Option<i32>,

    /// Budget not yet awarded.
    pub points_remain: i32,

    /// Budget already awarded to guests.
    #[sea_orm(default_value = 0)]
    pub points_awarded: i32,

    #[sea_orm(default_value = false)]
    pub published: bool,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Total point budget (remaining plus awarded).
    #[must_use]
    pub const fn total_points(&self) -> i32 {
        self.points_remain + self.points_awarded
    }

    #[must_use]
    pub fn has_started_at(&self, now: DateTimeWithTimeZone) -> bool {
        self.start_time <= now
    }

    #[must_use]
    pub fn has_ended_at(&self, now: DateTimeWithTimeZone) -> bool {
        self.end_time <= now
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::event_guest::Entity")]
    Guests,

    #[sea_orm(has_many = "super::event_organizer::Entity")]
    Organizers,
}

impl Related<super::event_guest::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Guests.def()
    }
}

impl Related<super::event_organizer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organizers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
