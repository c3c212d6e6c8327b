//! Access-policy predicates.
//!
//! Pure functions over roles and resource state. Services load the acting
//! user inside the enclosing database transaction and consult these before
//! mutating anything, so a role change committed by someone else is always
//! observed.

use points_common::{AppError, AppResult};
use points_db::entities::user::{self, UserRole};

/// Fail with `Forbidden` unless `actor` holds at least `min`.
pub fn require_role(actor: &user::Model, min: UserRole) -> AppResult<()> {
    if actor.role >= min {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "{} role required, {} has {}",
            min, actor.utorid, actor.role
        )))
    }
}

/// Whether `actor_role` may move a user currently holding `current` to `target`.
///
/// Managers shuffle users between regular and cashier only; superusers may
/// assign anything.
#[must_use]
pub const fn can_change_role(actor_role: UserRole, current: UserRole, target: UserRole) -> bool {
    match actor_role {
        UserRole::Superuser => true,
        UserRole::Manager => {
            matches!(current, UserRole::Regular | UserRole::Cashier)
                && matches!(target, UserRole::Regular | UserRole::Cashier)
        }
        UserRole::Regular | UserRole::Cashier => false,
    }
}

/// Validate a role change of `target_user` to `new_role` requested by `actor`.
pub fn check_role_change(
    actor: &user::Model,
    target_user: &user::Model,
    new_role: UserRole,
) -> AppResult<()> {
    if !can_change_role(actor.role, target_user.role, new_role) {
        return Err(AppError::forbidden(format!(
            "{} may not change {} from {} to {}",
            actor.role, target_user.utorid, target_user.role, new_role
        )));
    }
    if new_role == UserRole::Cashier
        && target_user.role == UserRole::Regular
        && target_user.suspicious
    {
        return Err(AppError::invalid(format!(
            "{} is flagged suspicious and cannot become a cashier",
            target_user.utorid
        )));
    }
    Ok(())
}

/// Adjustments and suspicious-flag reviews are manager work.
#[must_use]
pub const fn can_review_transactions(role: UserRole) -> bool {
    role.is_privileged()
}

/// Cashiers and above finalise redemptions and record purchases.
#[must_use]
pub const fn can_handle_sales(role: UserRole) -> bool {
    role.is_staff()
}

/// Organizers and managers run an event: edit it, invite guests, award points.
#[must_use]
pub const fn can_manage_event(role: UserRole, is_organizer: bool) -> bool {
    is_organizer || role.is_privileged()
}

/// Unpublished events are visible to the people running them only.
#[must_use]
pub const fn can_see_event(role: UserRole, is_organizer: bool, published: bool) -> bool {
    published || can_manage_event(role, is_organizer)
}
