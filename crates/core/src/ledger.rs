//! Ledger primitives.
//!
//! Every function here takes the caller's open database transaction. Balance
//! changes and the record that explains them commit or roll back together.

use chrono::Utc;
use points_common::{AppError, AppResult};
use points_db::db_error;
use points_db::entities::{
    PointTransaction, TransactionPromotion, User, UserPromotion, point_transaction,
    point_transaction::TransactionKind, transaction_promotion, user, user_promotion,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    sea_query::Expr,
};

/// The kind-specific part of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Entry {
    /// Points earned on a purchase; `suspicious` records a held credit.
    Purchase {
        spent: f64,
        points: i32,
        suspicious: bool,
    },
    /// Signed manual correction referring to an earlier transaction.
    Adjustment { amount: i32, related_transaction_id: i32 },
    /// Points sent to another user. Stored negative on the sender.
    Transfer { amount: i32, recipient_id: i32 },
    /// Request to convert points. Stored negative, unprocessed.
    Redemption { amount: i32 },
    /// Points awarded to one guest of an event.
    Event { amount: i32, event_id: i32 },
}

impl Entry {
    #[must_use]
    pub const fn kind(&self) -> TransactionKind {
        match self {
            Self::Purchase { .. } => TransactionKind::Purchase,
            Self::Adjustment { .. } => TransactionKind::Adjustment,
            Self::Transfer { .. } => TransactionKind::Transfer,
            Self::Redemption { .. } => TransactionKind::Redemption,
            Self::Event { .. } => TransactionKind::Event,
        }
    }

    /// Signed delta stored on the record.
    #[must_use]
    pub const fn points(&self) -> i32 {
        match *self {
            Self::Purchase { points, .. } => points,
            Self::Adjustment { amount, .. } | Self::Event { amount, .. } => amount,
            Self::Transfer { amount, .. } | Self::Redemption { amount } => -amount,
        }
    }

    #[must_use]
    pub const fn spent(&self) -> Option<f64> {
        match *self {
            Self::Purchase { spent, .. } => Some(spent),
            _ => None,
        }
    }

    #[must_use]
    pub const fn related_id(&self) -> Option<i32> {
        match *self {
            Self::Adjustment {
                related_transaction_id,
                ..
            } => Some(related_transaction_id),
            Self::Transfer { recipient_id, .. } => Some(recipient_id),
            Self::Event { event_id, .. } => Some(event_id),
            Self::Purchase { .. } | Self::Redemption { .. } => None,
        }
    }

    #[must_use]
    pub const fn suspicious(&self) -> bool {
        matches!(
            self,
            Self::Purchase {
                suspicious: true,
                ..
            }
        )
    }
}

/// A ledger record about to be written.
#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
    /// Owner of the record.
    pub utorid: &'a str,
    /// Acting user.
    pub created_by: &'a str,
    pub remark: Option<String>,
    pub entry: Entry,
}

/// Add `amount` points to a user's balance.
pub async fn credit<C: ConnectionTrait>(conn: &C, user_id: i32, amount: i32) -> AppResult<()> {
    if amount < 0 {
        return Err(AppError::Internal(format!("negative credit {amount}")));
    }

    let result = User::update_many()
        .col_expr(user::Column::Points, Expr::col(user::Column::Points).add(amount))
        .filter(user::Column::Id.eq(user_id))
        .exec(conn)
        .await
        .map_err(db_error)?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found(format!("user {user_id}")));
    }
    Ok(())
}

/// Remove `amount` points from a user's balance.
///
/// The balance check and the write are one conditional `UPDATE`, so two
/// concurrent debits can never take a balance below zero.
pub async fn debit<C: ConnectionTrait>(conn: &C, user_id: i32, amount: i32) -> AppResult<()> {
    if amount < 0 {
        return Err(AppError::Internal(format!("negative debit {amount}")));
    }

    let result = User::update_many()
        .col_expr(user::Column::Points, Expr::col(user::Column::Points).sub(amount))
        .filter(user::Column::Id.eq(user_id))
        .filter(user::Column::Points.gte(amount))
        .exec(conn)
        .await
        .map_err(db_error)?;

    if result.rows_affected == 1 {
        return Ok(());
    }

    let holder = User::find_by_id(user_id)
        .one(conn)
        .await
        .map_err(db_error)?
        .ok_or_else(|| AppError::not_found(format!("user {user_id}")))?;

    Err(AppError::InsufficientBalance {
        required: i64::from(amount),
        available: i64::from(holder.points),
    })
}

/// Credit a positive delta, debit a negative one.
pub async fn apply_delta<C: ConnectionTrait>(conn: &C, user_id: i32, delta: i32) -> AppResult<()> {
    if delta >= 0 {
        credit(conn, user_id, delta).await
    } else {
        debit(conn, user_id, delta.saturating_neg()).await
    }
}

/// Persist an immutable ledger record.
pub async fn record<C: ConnectionTrait>(
    conn: &C,
    new: NewRecord<'_>,
) -> AppResult<point_transaction::Model> {
    let entry = new.entry;

    point_transaction::ActiveModel {
        kind: Set(entry.kind()),
        utorid: Set(new.utorid.to_string()),
        points: Set(entry.points()),
        spent: Set(entry.spent()),
        related_id: Set(entry.related_id()),
        remark: Set(new.remark),
        created_by: Set(new.created_by.to_string()),
        suspicious: Set(entry.suspicious()),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(db_error)
}

/// Attach the cited promotions to a record.
pub async fn link_promotions<C: ConnectionTrait>(
    conn: &C,
    transaction_id: i32,
    promotion_ids: &[i32],
) -> AppResult<()> {
    if promotion_ids.is_empty() {
        return Ok(());
    }

    let rows = promotion_ids
        .iter()
        .map(|&promotion_id| transaction_promotion::ActiveModel {
            transaction_id: Set(transaction_id),
            promotion_id: Set(promotion_id),
        });

    TransactionPromotion::insert_many(rows)
        .exec_without_returning(conn)
        .await
        .map_err(db_error)?;
    Ok(())
}

/// Record one-time promotions as consumed by a user.
///
/// The composite key on `user_promotion` rejects a second consumption even
/// when two purchases race past the evaluator's check.
pub async fn mark_promotions_used<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    promotion_ids: &[i32],
) -> AppResult<()> {
    if promotion_ids.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let rows = promotion_ids
        .iter()
        .map(|&promotion_id| user_promotion::ActiveModel {
            user_id: Set(user_id),
            promotion_id: Set(promotion_id),
            used_at: Set(now.into()),
        });

    UserPromotion::insert_many(rows)
        .exec_without_returning(conn)
        .await
        .map_err(|e| match db_error(e) {
            AppError::Conflict(_) => AppError::invalid("promotion has already been used"),
            other => other,
        })?;
    Ok(())
}

/// Set a redemption's processor, once.
///
/// Returns `Conflict` if another processor got there first.
pub async fn claim_redemption<C: ConnectionTrait>(
    conn: &C,
    transaction_id: i32,
    processor_id: i32,
) -> AppResult<()> {
    let result = PointTransaction::update_many()
        .col_expr(point_transaction::Column::RelatedId, Expr::value(processor_id))
        .filter(point_transaction::Column::Id.eq(transaction_id))
        .filter(point_transaction::Column::Kind.eq(TransactionKind::Redemption))
        .filter(point_transaction::Column::RelatedId.is_null())
        .exec(conn)
        .await
        .map_err(db_error)?;

    if result.rows_affected == 0 {
        return Err(AppError::Conflict(format!(
            "redemption {transaction_id} has already been processed"
        )));
    }
    Ok(())
}

/// Flip a record's suspicious flag from `!to` to `to`.
///
/// Returns `false` when the flag already held `to`, in which case nothing
/// was written.
pub async fn flip_suspicious<C: ConnectionTrait>(
    conn: &C,
    transaction_id: i32,
    to: bool,
) -> AppResult<bool> {
    let result = PointTransaction::update_many()
        .col_expr(point_transaction::Column::Suspicious, Expr::value(to))
        .filter(point_transaction::Column::Id.eq(transaction_id))
        .filter(point_transaction::Column::Suspicious.eq(!to))
        .exec(conn)
        .await
        .map_err(db_error)?;

    Ok(result.rows_affected == 1)
}
