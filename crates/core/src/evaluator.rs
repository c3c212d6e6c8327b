//! Promotion evaluator.
//!
//! Computes the points a purchase earns: one point per quarter spent, plus
//! the bonuses of every running automatic promotion and of the one-time
//! promotions the customer cites.

use std::collections::{HashMap, HashSet};

use points_common::{AppError, AppResult};
use points_db::db_error;
use points_db::entities::{
    Promotion, UserPromotion, promotion, promotion::PromotionKind, user_promotion,
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    prelude::DateTimeWithTimeZone,
};

/// Cents of spending per base point.
pub const CENTS_PER_POINT: f64 = 25.0;

/// Round half up: `79.5 -> 80`, `2.5 -> 3`.
#[must_use]
pub fn round_points(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Points earned before any promotion.
#[must_use]
pub fn base_points(spent: f64) -> i64 {
    round_points(spent * 100.0 / CENTS_PER_POINT)
}

/// Flat plus rate bonus of a single promotion, each part rounded on its own.
#[must_use]
pub fn promotion_bonus(promotion: &promotion::Model, spent: f64) -> i64 {
    let flat = i64::from(promotion.points.unwrap_or(0));
    let rate = promotion.rate.map_or(0, |rate| round_points(spent * rate));
    flat.saturating_add(rate)
}

/// Narrow an accumulated amount to the stored point width.
fn to_points(value: i64) -> AppResult<i32> {
    i32::try_from(value)
        .map_err(|_| AppError::invalid("spent exceeds the representable point range"))
}

/// Outcome of evaluating a purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub base: i32,
    pub bonus: i32,
    pub total: i32,
    /// One-time promotions consumed by this purchase, in citation order.
    pub consumed: Vec<i32>,
    /// Automatic promotions that contributed.
    pub automatic: Vec<i32>,
}

/// Check that a cited promotion can be consumed by a user right now.
///
/// `spent` is `None` for adjustments, which carry no purchase amount and so
/// skip the minimum-spend test.
pub fn check_claim(
    id: i32,
    found: Option<&promotion::Model>,
    used: &HashSet<i32>,
    now: DateTimeWithTimeZone,
    spent: Option<f64>,
) -> AppResult<()> {
    let Some(promotion) = found else {
        return Err(AppError::invalid(format!("promotion {id} does not exist")));
    };
    if promotion.kind != PromotionKind::OneTime {
        return Err(AppError::invalid(format!(
            "promotion {id} is not a one-time promotion"
        )));
    }
    if !promotion.is_active_at(now) {
        return Err(AppError::invalid(format!("promotion {id} is not running")));
    }
    if spent.is_some_and(|spent| !promotion.accepts_spend(spent)) {
        return Err(AppError::invalid(format!(
            "purchase does not reach the minimum spend of promotion {id}"
        )));
    }
    if used.contains(&id) {
        return Err(AppError::invalid(format!("promotion {id} has already been used")));
    }
    Ok(())
}

/// Evaluate a purchase of `spent` dollars.
///
/// `claimed` lists the cited one-time ids in submission order; `found` maps
/// the ones that exist. A single bad citation rejects the whole purchase.
pub fn evaluate(
    spent: f64,
    now: DateTimeWithTimeZone,
    claimed: &[i32],
    found: &HashMap<i32, promotion::Model>,
    used: &HashSet<i32>,
    candidates: &[promotion::Model],
) -> AppResult<Evaluation> {
    if !spent.is_finite() || spent <= 0.0 {
        return Err(AppError::invalid("spent must be a positive amount"));
    }

    let base = base_points(spent);
    let mut bonus: i64 = 0;
    let mut consumed = Vec::with_capacity(claimed.len());

    for &id in claimed {
        if consumed.contains(&id) {
            return Err(AppError::invalid(format!("promotion {id} cited twice")));
        }
        let promotion = found.get(&id);
        check_claim(id, promotion, used, now, Some(spent))?;
        if let Some(promotion) = promotion {
            bonus = bonus.saturating_add(promotion_bonus(promotion, spent));
        }
        consumed.push(id);
    }

    let mut automatic = Vec::new();
    for promotion in candidates {
        if promotion.kind == PromotionKind::Automatic
            && promotion.is_active_at(now)
            && promotion.accepts_spend(spent)
        {
            bonus = bonus.saturating_add(promotion_bonus(promotion, spent));
            automatic.push(promotion.id);
        }
    }

    Ok(Evaluation {
        base: to_points(base)?,
        bonus: to_points(bonus)?,
        total: to_points(base.saturating_add(bonus))?,
        consumed,
        automatic,
    })
}

/// IDs of the one-time promotions a user has consumed.
pub async fn used_by<C: ConnectionTrait>(conn: &C, user_id: i32) -> AppResult<HashSet<i32>> {
    let ids = UserPromotion::find()
        .filter(user_promotion::Column::UserId.eq(user_id))
        .select_only()
        .column(user_promotion::Column::PromotionId)
        .into_tuple::<i32>()
        .all(conn)
        .await
        .map_err(db_error)?;
    Ok(ids.into_iter().collect())
}

/// Load the promotions cited by ID.
pub async fn load_cited<C: ConnectionTrait>(
    conn: &C,
    ids: &[i32],
) -> AppResult<HashMap<i32, promotion::Model>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = Promotion::find()
        .filter(promotion::Column::Id.is_in(ids.to_vec()))
        .all(conn)
        .await
        .map_err(db_error)?;
    Ok(rows.into_iter().map(|p| (p.id, p)).collect())
}

/// Load every automatic promotion. Time and spend windows are applied by
/// [`evaluate`].
pub async fn load_automatic<C: ConnectionTrait>(conn: &C) -> AppResult<Vec<promotion::Model>> {
    Promotion::find()
        .filter(promotion::Column::Kind.eq(PromotionKind::Automatic))
        .order_by_asc(promotion::Column::Id)
        .all(conn)
        .await
        .map_err(db_error)
}

/// Evaluate a purchase against the stored promotions, inside `conn`.
pub async fn evaluate_purchase<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    spent: f64,
    claimed: &[i32],
    now: DateTimeWithTimeZone,
) -> AppResult<Evaluation> {
    let found = load_cited(conn, claimed).await?;
    let used = used_by(conn, user_id).await?;
    let candidates = load_automatic(conn).await?;

    evaluate(spent, now, claimed, &found, &used, &candidates)
}

/// Validate one-time promotions cited by an adjustment, inside `conn`.
pub async fn check_claims<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    claimed: &[i32],
    now: DateTimeWithTimeZone,
) -> AppResult<()> {
    if claimed.is_empty() {
        return Ok(());
    }

    let found = load_cited(conn, claimed).await?;
    let used = used_by(conn, user_id).await?;

    let mut seen = HashSet::with_capacity(claimed.len());
    for &id in claimed {
        if !seen.insert(id) {
            return Err(AppError::invalid(format!("promotion {id} cited twice")));
        }
        check_claim(id, found.get(&id), &used, now, None)?;
    }
    Ok(())
}
