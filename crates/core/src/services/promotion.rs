//! Promotion service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use points_common::{AppError, AppResult, Page, Pagination};
use points_db::db_error;
use points_db::entities::promotion::{self, PromotionKind};
use points_db::entities::user::UserRole;
use points_db::repositories::{PromotionFilter, PromotionRepository};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, ModelTrait, Set};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use super::{begin, load_actor, now};
use crate::policy;

/// Divisor between the wire form of `rate` and the stored bonus per dollar.
pub const RATE_WIRE_SCALE: f64 = 100.0;

/// Input for creating a promotion.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromotionInput {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(length(min = 1, max = 4096))]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: PromotionKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(range(min = 0.0))]
    pub min_spending: Option<f64>,
    /// Extra points per dollar, times 100.
    #[validate(range(min = 0.0))]
    pub rate: Option<f64>,
    #[validate(range(min = 0))]
    pub points: Option<i32>,
}

/// Input for updating a promotion. Absent fields are left alone.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePromotionInput {
    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 4096))]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<PromotionKind>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[validate(range(min = 0.0))]
    pub min_spending: Option<f64>,
    #[validate(range(min = 0.0))]
    pub rate: Option<f64>,
    #[validate(range(min = 0))]
    pub points: Option<i32>,
}

impl UpdatePromotionInput {
    /// Whether anything other than the end time is being changed.
    const fn touches_more_than_end_time(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.kind.is_some()
            || self.start_time.is_some()
            || self.min_spending.is_some()
            || self.rate.is_some()
            || self.points.is_some()
    }
}

/// Listing query for promotions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionQuery {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<PromotionKind>,
    pub started: Option<bool>,
    pub ended: Option<bool>,
}

fn ensure_finite(field: &str, value: Option<f64>) -> AppResult<()> {
    match value {
        Some(v) if !v.is_finite() => Err(AppError::invalid(format!("{field} must be a number"))),
        _ => Ok(()),
    }
}

/// Convert the wire form of `rate` to the stored bonus per dollar.
#[must_use]
pub fn rate_from_wire(rate: f64) -> f64 {
    rate / RATE_WIRE_SCALE
}

/// Service for managing promotions.
#[derive(Clone)]
pub struct PromotionService {
    db: Arc<DatabaseConnection>,
    promotion_repo: PromotionRepository,
}

impl PromotionService {
    /// Create a new promotion service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            promotion_repo: PromotionRepository::new(Arc::clone(&db)),
            db,
        }
    }

    /// Create a promotion. Managers and above only.
    pub async fn create(
        &self,
        actor_id: i32,
        input: CreatePromotionInput,
    ) -> AppResult<promotion::Model> {
        input.validate()?;
        ensure_finite("minSpending", input.min_spending)?;
        ensure_finite("rate", input.rate)?;

        let actor = load_actor(self.db.as_ref(), actor_id).await?;
        policy::require_role(&actor, UserRole::Manager)?;

        let current = Utc::now();
        if input.start_time < current {
            return Err(AppError::invalid("start time must not be in the past"));
        }
        if input.end_time <= input.start_time {
            return Err(AppError::invalid("end time must be after start time"));
        }

        let model = promotion::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            kind: Set(input.kind),
            start_time: Set(input.start_time.into()),
            end_time: Set(input.end_time.into()),
            min_spending: Set(input.min_spending),
            rate: Set(input.rate.map(rate_from_wire)),
            points: Set(input.points),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(db_error)?;

        info!(actor_id, promotion_id = model.id, kind = ?model.kind, "Created promotion");
        Ok(model)
    }

    /// List promotions visible to the actor.
    ///
    /// Regular users see the one-time promotions they can still use; cashiers
    /// see everything of the requested kind; managers may also filter on
    /// whether a promotion has started or ended.
    pub async fn list(
        &self,
        actor_id: i32,
        query: PromotionQuery,
        pagination: Pagination,
    ) -> AppResult<Page<promotion::Model>> {
        pagination.validate()?;
        let actor = load_actor(self.db.as_ref(), actor_id).await?;
        let at = now();

        let filter = match actor.role {
            UserRole::Regular => {
                if query.started.is_some() || query.ended.is_some() {
                    return Err(AppError::invalid(
                        "started and ended filters are not available",
                    ));
                }
                PromotionFilter {
                    name: query.name,
                    kind: Some(PromotionKind::OneTime),
                    active_at: Some(at),
                    unused_by: Some(actor.id),
                    ..Default::default()
                }
            }
            UserRole::Cashier => PromotionFilter {
                name: query.name,
                kind: query.kind,
                ..Default::default()
            },
            UserRole::Manager | UserRole::Superuser => {
                if query.started.is_some() && query.ended.is_some() {
                    return Err(AppError::invalid(
                        "started and ended cannot be combined",
                    ));
                }
                PromotionFilter {
                    name: query.name,
                    kind: query.kind,
                    started: query.started,
                    ended: query.ended,
                    now: Some(at),
                    ..Default::default()
                }
            }
        };

        self.promotion_repo.list(&filter, pagination).await
    }

    /// View one promotion. Outside of managers, only running ones are visible.
    pub async fn get(&self, actor_id: i32, promotion_id: i32) -> AppResult<promotion::Model> {
        let actor = load_actor(self.db.as_ref(), actor_id).await?;
        let found = self.promotion_repo.get_by_id(promotion_id).await?;

        if !actor.role.is_privileged() && !found.is_active_at(now()) {
            return Err(AppError::not_found(format!("promotion {promotion_id}")));
        }
        Ok(found)
    }

    /// Update a promotion. Managers and above only.
    ///
    /// Once a promotion has started only its end time may move; once it has
    /// ended it is frozen.
    pub async fn update(
        &self,
        actor_id: i32,
        promotion_id: i32,
        input: UpdatePromotionInput,
    ) -> AppResult<promotion::Model> {
        input.validate()?;
        ensure_finite("minSpending", input.min_spending)?;
        ensure_finite("rate", input.rate)?;

        let txn = begin(self.db.as_ref()).await?;
        let actor = load_actor(&txn, actor_id).await?;
        policy::require_role(&actor, UserRole::Manager)?;

        let existing = promotion::Entity::find_by_id(promotion_id)
            .one(&txn)
            .await
            .map_err(db_error)?
            .ok_or_else(|| AppError::not_found(format!("promotion {promotion_id}")))?;

        let current = now();
        if existing.end_time <= current {
            return Err(AppError::invalid("promotion has ended and can no longer be edited"));
        }
        if existing.start_time <= current && input.touches_more_than_end_time() {
            return Err(AppError::invalid(
                "only the end time of a running promotion can be edited",
            ));
        }

        let start = input.start_time.map_or(existing.start_time, Into::into);
        let end = input.end_time.map_or(existing.end_time, Into::into);
        if input.start_time.is_some() && start <= current {
            return Err(AppError::invalid("start time must be in the future"));
        }
        if input.end_time.is_some() && end <= current {
            return Err(AppError::invalid("end time must be in the future"));
        }
        if end <= start {
            return Err(AppError::invalid("end time must be after start time"));
        }

        let mut active: promotion::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(kind) = input.kind {
            active.kind = Set(kind);
        }
        if input.start_time.is_some() {
            active.start_time = Set(start);
        }
        if input.end_time.is_some() {
            active.end_time = Set(end);
        }
        if let Some(min_spending) = input.min_spending {
            active.min_spending = Set(Some(min_spending));
        }
        if let Some(rate) = input.rate {
            active.rate = Set(Some(rate_from_wire(rate)));
        }
        if let Some(points) = input.points {
            active.points = Set(Some(points));
        }

        let updated = active.update(&txn).await.map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        info!(actor_id, promotion_id, "Updated promotion");
        Ok(updated)
    }

    /// Delete a promotion that has not started yet. Managers and above only.
    pub async fn delete(&self, actor_id: i32, promotion_id: i32) -> AppResult<()> {
        let txn = begin(self.db.as_ref()).await?;
        let actor = load_actor(&txn, actor_id).await?;
        policy::require_role(&actor, UserRole::Manager)?;

        let existing = promotion::Entity::find_by_id(promotion_id)
            .one(&txn)
            .await
            .map_err(db_error)?
            .ok_or_else(|| AppError::not_found(format!("promotion {promotion_id}")))?;

        if existing.start_time <= now() {
            return Err(AppError::forbidden("a promotion cannot be deleted once it has started"));
        }

        existing.delete(&txn).await.map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        info!(actor_id, promotion_id, "Deleted promotion");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_from_wire() {
        assert!((rate_from_wire(50.0) - 0.5).abs() < f64::EPSILON);
        assert!((rate_from_wire(2.0) - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn test_running_promotion_edit_scope() {
        let only_end = UpdatePromotionInput {
            end_time: Some(Utc::now()),
            ..Default::default()
        };
        assert!(!only_end.touches_more_than_end_time());

        let with_points = UpdatePromotionInput {
            points: Some(10),
            end_time: Some(Utc::now()),
            ..Default::default()
        };
        assert!(with_points.touches_more_than_end_time());
    }

    #[test]
    fn test_negative_values_fail_validation() {
        let input = UpdatePromotionInput {
            rate: Some(-1.0),
            ..Default::default()
        };
        assert!(input.validate().is_err());

        let input = UpdatePromotionInput {
            points: Some(-5),
            ..Default::default()
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_non_finite_amounts_rejected() {
        assert!(ensure_finite("rate", Some(f64::INFINITY)).is_err());
        assert!(ensure_finite("rate", Some(1.5)).is_ok());
        assert!(ensure_finite("rate", None).is_ok());
    }
}
