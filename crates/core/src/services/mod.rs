//! Business logic services.

#![allow(missing_docs)]

pub mod event;
pub mod promotion;
pub mod transaction;
pub mod user;

pub use event::{
    CreateEventInput, EventDetail, EventQuery, EventService, GuestAdded, UpdateEventInput,
    UserSummary,
};
pub use promotion::{CreatePromotionInput, PromotionQuery, PromotionService, UpdatePromotionInput};
pub use transaction::{
    AdjustmentInput, AmountOperator, AwardInput, MyTransactionQuery, PurchaseInput,
    RedemptionInput, TransactionQuery, TransactionResponse, TransactionService, TransferInput,
};
pub use user::{
    RegisterUserInput, Registration, UpdateMeInput, UpdateUserInput, UserDetail, UserService,
};

use chrono::Utc;
use points_common::{AppError, AppResult};
use points_db::db_error;
use points_db::entities::{User, user as user_entity};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IsolationLevel, QueryFilter, TransactionTrait, prelude::DateTimeWithTimeZone,
};

/// Open a serializable transaction for a mutating operation.
pub(crate) async fn begin(db: &DatabaseConnection) -> AppResult<DatabaseTransaction> {
    db.begin_with_config(Some(IsolationLevel::Serializable), None)
        .await
        .map_err(db_error)
}

/// Load the acting user. An unknown actor is `Unauthorized`, not `NotFound`.
pub(crate) async fn load_actor<C: ConnectionTrait>(
    conn: &C,
    actor_id: i32,
) -> AppResult<user_entity::Model> {
    User::find_by_id(actor_id)
        .one(conn)
        .await
        .map_err(db_error)?
        .ok_or(AppError::Unauthorized)
}

pub(crate) async fn user_by_id<C: ConnectionTrait>(
    conn: &C,
    id: i32,
) -> AppResult<user_entity::Model> {
    User::find_by_id(id)
        .one(conn)
        .await
        .map_err(db_error)?
        .ok_or_else(|| AppError::not_found(format!("user {id}")))
}

pub(crate) async fn user_by_utorid<C: ConnectionTrait>(
    conn: &C,
    utorid: &str,
) -> AppResult<user_entity::Model> {
    User::find()
        .filter(user_entity::Column::Utorid.eq(utorid))
        .one(conn)
        .await
        .map_err(db_error)?
        .ok_or_else(|| AppError::not_found(format!("user {utorid}")))
}

pub(crate) fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}
