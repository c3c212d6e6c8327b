//! Promotion repository.

use std::sync::Arc;

use crate::db_error;
use crate::entities::{
    Promotion, UserPromotion, promotion, promotion::PromotionKind, user_promotion,
};
use points_common::{AppError, AppResult, Page, Pagination};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, QueryTrait, Select, prelude::DateTimeWithTimeZone,
};

/// Filters accepted by the promotion listing.
#[derive(Debug, Clone, Default)]
pub struct PromotionFilter {
    /// Substring of the promotion name.
    pub name: Option<String>,
    /// Promotion kind.
    pub kind: Option<PromotionKind>,
    /// `Some(true)` keeps promotions whose start time has passed.
    pub started: Option<bool>,
    /// `Some(true)` keeps promotions whose end time has passed.
    pub ended: Option<bool>,
    /// Keep only promotions running at this instant.
    pub active_at: Option<DateTimeWithTimeZone>,
    /// Hide one-time promotions this user has already consumed.
    pub unused_by: Option<i32>,
    /// Reference instant for `started`/`ended`.
    pub now: Option<DateTimeWithTimeZone>,
}

/// Promotion repository for read-side database operations.
#[derive(Clone)]
pub struct PromotionRepository {
    db: Arc<DatabaseConnection>,
}

impl PromotionRepository {
    /// Create a new promotion repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a promotion by ID.
    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<promotion::Model>> {
        Promotion::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Find a promotion by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i32) -> AppResult<promotion::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("promotion {id}")))
    }

    /// One-time promotions running at `now` that `user_id` has not consumed.
    pub async fn find_available_one_time(
        &self,
        user_id: i32,
        now: DateTimeWithTimeZone,
    ) -> AppResult<Vec<promotion::Model>> {
        let filter = PromotionFilter {
            kind: Some(PromotionKind::OneTime),
            active_at: Some(now),
            unused_by: Some(user_id),
            ..Default::default()
        };

        Self::filtered(&filter)
            .order_by_asc(promotion::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// List promotions matching a filter, ordered by ID.
    pub async fn list(
        &self,
        filter: &PromotionFilter,
        pagination: Pagination,
    ) -> AppResult<Page<promotion::Model>> {
        let query = Self::filtered(filter);

        let count = query
            .clone()
            .count(self.db.as_ref())
            .await
            .map_err(db_error)?;

        let results = query
            .order_by_asc(promotion::Column::Id)
            .offset(pagination.offset())
            .limit(pagination.limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)?;

        Ok(Page { count, results })
    }

    fn filtered(filter: &PromotionFilter) -> Select<Promotion> {
        let mut condition = Condition::all();

        if let Some(name) = &filter.name {
            condition = condition.add(promotion::Column::Name.contains(name));
        }
        if let Some(kind) = filter.kind {
            condition = condition.add(promotion::Column::Kind.eq(kind));
        }
        if let Some(now) = filter.now {
            if let Some(started) = filter.started {
                condition = condition.add(if started {
                    promotion::Column::StartTime.lte(now)
                } else {
                    promotion::Column::StartTime.gt(now)
                });
            }
            if let Some(ended) = filter.ended {
                condition = condition.add(if ended {
                    promotion::Column::EndTime.lte(now)
                } else {
                    promotion::Column::EndTime.gt(now)
                });
            }
        }
        if let Some(at) = filter.active_at {
            condition = condition
                .add(promotion::Column::StartTime.lte(at))
                .add(promotion::Column::EndTime.gte(at));
        }
        if let Some(user_id) = filter.unused_by {
            let used = UserPromotion::find()
                .select_only()
                .column(user_promotion::Column::PromotionId)
                .filter(user_promotion::Column::UserId.eq(user_id))
                .into_query();
            condition = condition.add(promotion::Column::Id.not_in_subquery(used));
        }

        Promotion::find().filter(condition)
    }
}
