//! Event capacity and point budget.
//!
//! Seat and budget counters move through conditional `UPDATE`s inside the
//! caller's transaction. The pure helpers compute the new counters when a
//! manager edits capacity or the total budget.

use points_common::{AppError, AppResult};
use points_db::db_error;
use points_db::entities::{Event, event};
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, sea_query::Expr};

/// Take one seat. Fails with `Gone` when no space is left.
pub async fn reserve_seat<C: ConnectionTrait>(conn: &C, event_id: i32) -> AppResult<()> {
    let result = Event::update_many()
        .col_expr(
            event::Column::SpaceRemain,
            Expr::col(event::Column::SpaceRemain).sub(1),
        )
        .filter(event::Column::Id.eq(event_id))
        .filter(
            Condition::any()
                .add(event::Column::SpaceRemain.is_null())
                .add(event::Column::SpaceRemain.gt(0)),
        )
        .exec(conn)
        .await
        .map_err(db_error)?;

    if result.rows_affected == 0 {
        return Err(AppError::Gone(format!("event {event_id} is full")));
    }
    Ok(())
}

/// Give a seat back. Unlimited events keep a NULL counter.
pub async fn release_seat<C: ConnectionTrait>(conn: &C, event_id: i32) -> AppResult<()> {
    Event::update_many()
        .col_expr(
            event::Column::SpaceRemain,
            Expr::col(event::Column::SpaceRemain).add(1),
        )
        .filter(event::Column::Id.eq(event_id))
        .filter(event::Column::SpaceRemain.is_not_null())
        .exec(conn)
        .await
        .map_err(db_error)?;
    Ok(())
}

/// Move `total` points from the event's remaining budget to its awarded tally.
pub async fn spend<C: ConnectionTrait>(conn: &C, event_id: i32, total: i32) -> AppResult<()> {
    let result = Event::update_many()
        .col_expr(
            event::Column::PointsRemain,
            Expr::col(event::Column::PointsRemain).sub(total),
        )
        .col_expr(
            event::Column::PointsAwarded,
            Expr::col(event::Column::PointsAwarded).add(total),
        )
        .filter(event::Column::Id.eq(event_id))
        .filter(event::Column::PointsRemain.gte(total))
        .exec(conn)
        .await
        .map_err(db_error)?;

    if result.rows_affected == 0 {
        return Err(AppError::invalid(format!(
            "event {event_id} does not have {total} points left to award"
        )));
    }
    Ok(())
}

/// Points needed to give `amount` to each of `recipients` guests.
pub fn award_total(amount: i32, recipients: usize) -> AppResult<i32> {
    i32::try_from(recipients)
        .ok()
        .and_then(|n| amount.checked_mul(n))
        .ok_or_else(|| AppError::invalid("award exceeds the representable point range"))
}

/// Remaining budget after a manager sets the total budget to `new_total`.
pub fn rebudget(event: &event::Model, new_total: i32) -> AppResult<i32> {
    if new_total <= 0 {
        return Err(AppError::invalid("points must be a positive integer"));
    }
    if new_total < event.points_awarded {
        return Err(AppError::invalid(format!(
            "{} points have already been awarded",
            event.points_awarded
        )));
    }
    Ok(new_total - event.points_awarded)
}

/// Remaining space after changing capacity, given the current guest count.
pub fn resize(new_capacity: Option<i32>, guests: u64) -> AppResult<Option<i32>> {
    let Some(capacity) = new_capacity else {
        return Ok(None);
    };
    if capacity < 0 {
        return Err(AppError::invalid("capacity must not be negative"));
    }
    let guests = i32::try_from(guests).unwrap_or(i32::MAX);
    if capacity < guests {
        return Err(AppError::invalid(format!(
            "capacity {capacity} is below the {guests} guests already confirmed"
        )));
    }
    Ok(Some(capacity - guests))
}
