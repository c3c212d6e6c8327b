//! Point transaction service.
//!
//! Each creating operation runs in one serializable database transaction:
//! the ledger record, every balance change it causes, promotion usage and
//! event budget movement commit together or not at all.

use std::sync::Arc;

use points_common::{AppError, AppResult, Page, Pagination};
use points_db::db_error;
use points_db::entities::point_transaction::{self, TransactionKind};
use points_db::entities::user::{self, UserRole};
use points_db::entities::{Event, EventGuest, EventOrganizer, PointTransaction, User};
use points_db::repositories::{AmountFilter, TransactionFilter, TransactionRepository};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

use super::event::guest_ids;
use super::{begin, load_actor, now, user_by_utorid};
use crate::ledger::{self, Entry, NewRecord};
use crate::{budget, evaluator, policy};

/// Input for a purchase rung up by a cashier.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseInput {
    /// Customer.
    pub utorid: String,
    /// Dollars spent.
    pub spent: f64,
    /// One-time promotions the customer cites, in order.
    #[serde(default)]
    pub promotion_ids: Vec<i32>,
    #[validate(length(max = 1024))]
    pub remark: Option<String>,
}

/// Input for a manager's correction of an earlier transaction.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentInput {
    pub utorid: String,
    /// Signed point delta.
    pub amount: i32,
    /// Transaction being corrected.
    pub related_id: i32,
    #[serde(default)]
    pub promotion_ids: Vec<i32>,
    #[validate(length(max = 1024))]
    pub remark: Option<String>,
}

/// Input for sending points to another user.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TransferInput {
    /// Recipient.
    pub utorid: String,
    #[validate(range(min = 1))]
    pub amount: i32,
    #[validate(length(max = 1024))]
    pub remark: Option<String>,
}

/// Input for requesting a redemption.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionInput {
    #[validate(range(min = 0))]
    pub amount: i32,
    #[validate(length(max = 1024))]
    pub remark: Option<String>,
}

/// Input for awarding event points, to one guest or to all of them.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AwardInput {
    /// Single recipient; every guest when absent.
    pub utorid: Option<String>,
    #[validate(range(min = 1))]
    pub amount: i32,
    #[validate(length(max = 1024))]
    pub remark: Option<String>,
}

/// Comparison used by the amount filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountOperator {
    Gte,
    Lte,
}

/// Listing query for all transactions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub name: Option<String>,
    pub created_by: Option<String>,
    pub suspicious: Option<bool>,
    pub promotion_id: Option<i32>,
    #[serde(rename = "type")]
    pub kind: Option<TransactionKind>,
    pub related_id: Option<i32>,
    pub amount: Option<i32>,
    pub operator: Option<AmountOperator>,
}

/// Listing query for the acting user's own transactions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyTransactionQuery {
    #[serde(rename = "type")]
    pub kind: Option<TransactionKind>,
    pub related_id: Option<i32>,
    pub promotion_id: Option<i32>,
    pub amount: Option<i32>,
    pub operator: Option<AmountOperator>,
}

/// A transaction with the promotions it cites.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    #[serde(flatten)]
    pub transaction: point_transaction::Model,
    pub promotion_ids: Vec<i32>,
}

impl TransactionResponse {
    fn new(transaction: point_transaction::Model, promotion_ids: Vec<i32>) -> Self {
        Self {
            transaction,
            promotion_ids,
        }
    }
}

fn amount_filter(
    amount: Option<i32>,
    operator: Option<AmountOperator>,
) -> AppResult<Option<AmountFilter>> {
    match (amount, operator) {
        (None, None) => Ok(None),
        (Some(n), Some(AmountOperator::Gte)) => Ok(Some(AmountFilter::AtLeast(n))),
        (Some(n), Some(AmountOperator::Lte)) => Ok(Some(AmountFilter::AtMost(n))),
        _ => Err(AppError::invalid("amount and operator must be given together")),
    }
}

fn check_related_filter(kind: Option<TransactionKind>, related_id: Option<i32>) -> AppResult<()> {
    if related_id.is_none() {
        return Ok(());
    }
    match kind {
        Some(kind) if kind.has_related_id() => Ok(()),
        _ => Err(AppError::invalid(
            "relatedId requires a type other than purchase",
        )),
    }
}

async fn transaction_in<C: ConnectionTrait>(
    conn: &C,
    transaction_id: i32,
) -> AppResult<point_transaction::Model> {
    PointTransaction::find_by_id(transaction_id)
        .one(conn)
        .await
        .map_err(db_error)?
        .ok_or_else(|| AppError::not_found(format!("transaction {transaction_id}")))
}

/// Service for creating, reviewing and listing point transactions.
#[derive(Clone)]
pub struct TransactionService {
    db: Arc<DatabaseConnection>,
    transaction_repo: TransactionRepository,
}

impl TransactionService {
    /// Create a new transaction service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            transaction_repo: TransactionRepository::new(Arc::clone(&db)),
            db,
        }
    }

    // ==================== Purchases & Adjustments ====================

    /// Record a purchase and credit the customer.
    ///
    /// A purchase rung up by a suspicious cashier is stored flagged with its
    /// computed points, but the customer's balance is left alone until a
    /// manager clears the flag.
    pub async fn create_purchase(
        &self,
        actor_id: i32,
        input: PurchaseInput,
    ) -> AppResult<TransactionResponse> {
        input.validate()?;

        let txn = begin(self.db.as_ref()).await?;
        let cashier = load_actor(&txn, actor_id).await?;
        if !policy::can_handle_sales(cashier.role) {
            return Err(AppError::forbidden("only cashiers may record purchases"));
        }
        let customer = user_by_utorid(&txn, &input.utorid).await?;

        let evaluation = evaluator::evaluate_purchase(
            &txn,
            customer.id,
            input.spent,
            &input.promotion_ids,
            now(),
        )
        .await?;

        let record = ledger::record(
            &txn,
            NewRecord {
                utorid: &customer.utorid,
                created_by: &cashier.utorid,
                remark: input.remark,
                entry: Entry::Purchase {
                    spent: input.spent,
                    points: evaluation.total,
                    suspicious: cashier.suspicious,
                },
            },
        )
        .await?;
        ledger::link_promotions(&txn, record.id, &evaluation.consumed).await?;
        ledger::mark_promotions_used(&txn, customer.id, &evaluation.consumed).await?;

        if cashier.suspicious {
            debug!(
                transaction_id = record.id,
                cashier = %cashier.utorid,
                "Withholding credit for purchase by suspicious cashier"
            );
        } else {
            ledger::credit(&txn, customer.id, evaluation.total).await?;
        }
        txn.commit().await.map_err(db_error)?;

        info!(
            transaction_id = record.id,
            customer = %customer.utorid,
            base = evaluation.base,
            bonus = evaluation.bonus,
            total = evaluation.total,
            "Recorded purchase"
        );
        Ok(TransactionResponse::new(record, evaluation.consumed))
    }

    /// Record a manual correction against an existing transaction.
    pub async fn create_adjustment(
        &self,
        actor_id: i32,
        input: AdjustmentInput,
    ) -> AppResult<TransactionResponse> {
        input.validate()?;
        if input.amount == 0 {
            return Err(AppError::invalid("amount must be non-zero"));
        }

        let txn = begin(self.db.as_ref()).await?;
        let manager = load_actor(&txn, actor_id).await?;
        policy::require_role(&manager, UserRole::Manager)?;

        let target = user_by_utorid(&txn, &input.utorid).await?;
        transaction_in(&txn, input.related_id).await?;
        evaluator::check_claims(&txn, target.id, &input.promotion_ids, now()).await?;

        let record = ledger::record(
            &txn,
            NewRecord {
                utorid: &target.utorid,
                created_by: &manager.utorid,
                remark: input.remark,
                entry: Entry::Adjustment {
                    amount: input.amount,
                    related_transaction_id: input.related_id,
                },
            },
        )
        .await?;
        ledger::link_promotions(&txn, record.id, &input.promotion_ids).await?;
        ledger::mark_promotions_used(&txn, target.id, &input.promotion_ids).await?;
        ledger::apply_delta(&txn, target.id, input.amount).await?;
        txn.commit().await.map_err(db_error)?;

        info!(
            transaction_id = record.id,
            target = %target.utorid,
            amount = input.amount,
            related_id = input.related_id,
            "Recorded adjustment"
        );
        Ok(TransactionResponse::new(record, input.promotion_ids))
    }

    // ==================== Transfers & Redemptions ====================

    /// Move points from the acting user to another user.
    pub async fn create_transfer(
        &self,
        actor_id: i32,
        input: TransferInput,
    ) -> AppResult<TransactionResponse> {
        input.validate()?;

        let txn = begin(self.db.as_ref()).await?;
        let sender = load_actor(&txn, actor_id).await?;
        if !sender.verified {
            return Err(AppError::forbidden("only verified users may transfer points"));
        }
        let recipient = user_by_utorid(&txn, &input.utorid).await?;
        if recipient.id == sender.id {
            return Err(AppError::invalid("cannot transfer points to yourself"));
        }

        ledger::debit(&txn, sender.id, input.amount).await?;
        ledger::credit(&txn, recipient.id, input.amount).await?;
        let record = ledger::record(
            &txn,
            NewRecord {
                utorid: &sender.utorid,
                created_by: &sender.utorid,
                remark: input.remark,
                entry: Entry::Transfer {
                    amount: input.amount,
                    recipient_id: recipient.id,
                },
            },
        )
        .await?;
        txn.commit().await.map_err(db_error)?;

        info!(
            transaction_id = record.id,
            sender = %sender.utorid,
            recipient = %recipient.utorid,
            amount = input.amount,
            "Recorded transfer"
        );
        Ok(TransactionResponse::new(record, Vec::new()))
    }

    /// Record the acting user's intent to redeem points. The balance does not
    /// move until a cashier processes the request.
    pub async fn request_redemption(
        &self,
        actor_id: i32,
        input: RedemptionInput,
    ) -> AppResult<TransactionResponse> {
        input.validate()?;

        let txn = begin(self.db.as_ref()).await?;
        let requester = load_actor(&txn, actor_id).await?;
        if !requester.verified {
            return Err(AppError::forbidden("only verified users may redeem points"));
        }
        if input.amount > requester.points {
            return Err(AppError::InsufficientBalance {
                required: i64::from(input.amount),
                available: i64::from(requester.points),
            });
        }

        let record = ledger::record(
            &txn,
            NewRecord {
                utorid: &requester.utorid,
                created_by: &requester.utorid,
                remark: input.remark,
                entry: Entry::Redemption {
                    amount: input.amount,
                },
            },
        )
        .await?;
        txn.commit().await.map_err(db_error)?;

        info!(
            transaction_id = record.id,
            requester = %requester.utorid,
            amount = input.amount,
            "Redemption requested"
        );
        Ok(TransactionResponse::new(record, Vec::new()))
    }

    /// Finalize a pending redemption, deducting the points. Cashiers and above.
    ///
    /// A redemption can be processed once; later attempts fail with
    /// `Conflict` and leave the balance alone.
    pub async fn process_redemption(
        &self,
        actor_id: i32,
        transaction_id: i32,
    ) -> AppResult<TransactionResponse> {
        let txn = begin(self.db.as_ref()).await?;
        let cashier = load_actor(&txn, actor_id).await?;
        if !policy::can_handle_sales(cashier.role) {
            return Err(AppError::forbidden("only cashiers may process redemptions"));
        }

        let pending = transaction_in(&txn, transaction_id).await?;
        if pending.kind != TransactionKind::Redemption {
            return Err(AppError::invalid(format!(
                "transaction {transaction_id} is not a redemption"
            )));
        }
        if pending.is_processed_redemption() {
            debug!(transaction_id, "Redemption already processed");
            return Err(AppError::Conflict(format!(
                "redemption {transaction_id} has already been processed"
            )));
        }

        ledger::claim_redemption(&txn, transaction_id, cashier.id).await?;
        let owner = user_by_utorid(&txn, &pending.utorid).await?;
        ledger::apply_delta(&txn, owner.id, pending.points).await?;

        let processed = transaction_in(&txn, transaction_id).await?;
        txn.commit().await.map_err(db_error)?;

        info!(
            transaction_id,
            owner = %owner.utorid,
            processed_by = %cashier.utorid,
            points = processed.points,
            "Processed redemption"
        );
        Ok(TransactionResponse::new(processed, Vec::new()))
    }

    // ==================== Events ====================

    /// Award event points to one guest, or to every guest.
    ///
    /// The whole award is taken from the event budget in one step; if the
    /// budget cannot cover every recipient nobody is credited.
    pub async fn award_event_points(
        &self,
        actor_id: i32,
        event_id: i32,
        input: AwardInput,
    ) -> AppResult<Vec<TransactionResponse>> {
        input.validate()?;

        let txn = begin(self.db.as_ref()).await?;
        let actor = load_actor(&txn, actor_id).await?;
        Event::find_by_id(event_id)
            .one(&txn)
            .await
            .map_err(db_error)?
            .ok_or_else(|| AppError::not_found(format!("event {event_id}")))?;
        let is_organizer = EventOrganizer::find_by_id((event_id, actor.id))
            .one(&txn)
            .await
            .map_err(db_error)?
            .is_some();
        if !policy::can_manage_event(actor.role, is_organizer) {
            return Err(AppError::forbidden(
                "only organizers and managers may award event points",
            ));
        }

        let recipients: Vec<user::Model> = match &input.utorid {
            Some(utorid) => {
                let guest = user_by_utorid(&txn, utorid).await?;
                let attends = EventGuest::find_by_id((event_id, guest.id))
                    .one(&txn)
                    .await
                    .map_err(db_error)?
                    .is_some();
                if !attends {
                    return Err(AppError::invalid(format!(
                        "{utorid} is not a guest of event {event_id}"
                    )));
                }
                vec![guest]
            }
            None => {
                let ids = guest_ids(&txn, event_id).await?;
                if ids.is_empty() {
                    return Err(AppError::invalid(format!("event {event_id} has no guests")));
                }
                User::find()
                    .filter(user::Column::Id.is_in(ids))
                    .order_by_asc(user::Column::Id)
                    .all(&txn)
                    .await
                    .map_err(db_error)?
            }
        };

        let total = budget::award_total(input.amount, recipients.len())?;
        budget::spend(&txn, event_id, total).await?;

        let mut awarded = Vec::with_capacity(recipients.len());
        for guest in &recipients {
            ledger::credit(&txn, guest.id, input.amount).await?;
            let record = ledger::record(
                &txn,
                NewRecord {
                    utorid: &guest.utorid,
                    created_by: &actor.utorid,
                    remark: input.remark.clone(),
                    entry: Entry::Event {
                        amount: input.amount,
                        event_id,
                    },
                },
            )
            .await?;
            awarded.push(TransactionResponse::new(record, Vec::new()));
        }
        txn.commit().await.map_err(db_error)?;

        info!(
            event_id,
            recipients = recipients.len(),
            amount = input.amount,
            total,
            "Awarded event points"
        );
        Ok(awarded)
    }

    // ==================== Review ====================

    /// Flag or clear a transaction for review. Managers and above only.
    ///
    /// Flagging takes the transaction's points back from its owner; clearing
    /// gives them back. Setting the flag to its current value changes nothing.
    pub async fn set_suspicious(
        &self,
        actor_id: i32,
        transaction_id: i32,
        suspicious: bool,
    ) -> AppResult<TransactionResponse> {
        let txn = begin(self.db.as_ref()).await?;
        let manager = load_actor(&txn, actor_id).await?;
        if !policy::can_review_transactions(manager.role) {
            return Err(AppError::forbidden("only managers may review transactions"));
        }

        let current = transaction_in(&txn, transaction_id).await?;
        if !current.kind.is_reviewable() {
            return Err(AppError::invalid(format!(
                "{} transactions cannot be flagged",
                current.kind
            )));
        }

        if ledger::flip_suspicious(&txn, transaction_id, suspicious).await? {
            let owner = user_by_utorid(&txn, &current.utorid).await?;
            let delta = if suspicious {
                current.points.saturating_neg()
            } else {
                current.points
            };
            ledger::apply_delta(&txn, owner.id, delta).await?;
            info!(
                transaction_id,
                suspicious,
                owner = %owner.utorid,
                delta,
                "Changed review flag"
            );
        } else {
            debug!(transaction_id, suspicious, "Review flag already set");
        }

        let updated = transaction_in(&txn, transaction_id).await?;
        txn.commit().await.map_err(db_error)?;

        let promotion_ids = self.transaction_repo.promotion_ids(transaction_id).await?;
        Ok(TransactionResponse::new(updated, promotion_ids))
    }

    // ==================== Lookup ====================

    /// View one transaction. Managers and above only.
    pub async fn get(&self, actor_id: i32, transaction_id: i32) -> AppResult<TransactionResponse> {
        let actor = load_actor(self.db.as_ref(), actor_id).await?;
        policy::require_role(&actor, UserRole::Manager)?;

        let found = self.transaction_repo.get_by_id(transaction_id).await?;
        let promotion_ids = self.transaction_repo.promotion_ids(found.id).await?;
        Ok(TransactionResponse::new(found, promotion_ids))
    }

    /// List every transaction. Managers and above only.
    pub async fn list(
        &self,
        actor_id: i32,
        query: TransactionQuery,
        pagination: Pagination,
    ) -> AppResult<Page<TransactionResponse>> {
        pagination.validate()?;
        let actor = load_actor(self.db.as_ref(), actor_id).await?;
        policy::require_role(&actor, UserRole::Manager)?;

        check_related_filter(query.kind, query.related_id)?;
        let filter = TransactionFilter {
            name: query.name,
            utorid: None,
            created_by: query.created_by,
            suspicious: query.suspicious,
            promotion_id: query.promotion_id,
            kind: query.kind,
            related_id: query.related_id,
            amount: amount_filter(query.amount, query.operator)?,
        };
        self.page_with_promotions(&filter, pagination).await
    }

    /// List the acting user's own transactions.
    pub async fn list_mine(
        &self,
        actor_id: i32,
        query: MyTransactionQuery,
        pagination: Pagination,
    ) -> AppResult<Page<TransactionResponse>> {
        pagination.validate()?;
        let me = load_actor(self.db.as_ref(), actor_id).await?;

        check_related_filter(query.kind, query.related_id)?;
        let filter = TransactionFilter {
            utorid: Some(me.utorid),
            promotion_id: query.promotion_id,
            kind: query.kind,
            related_id: query.related_id,
            amount: amount_filter(query.amount, query.operator)?,
            ..Default::default()
        };
        self.page_with_promotions(&filter, pagination).await
    }

    async fn page_with_promotions(
        &self,
        filter: &TransactionFilter,
        pagination: Pagination,
    ) -> AppResult<Page<TransactionResponse>> {
        let page = self.transaction_repo.list(filter, pagination).await?;
        let ids: Vec<i32> = page.results.iter().map(|t| t.id).collect();
        let mut cited = self.transaction_repo.promotion_ids_for(&ids).await?;

        Ok(page.map(|t| {
            let promotion_ids = cited.remove(&t.id).unwrap_or_default();
            TransactionResponse::new(t, promotion_ids)
        }))
    }
}
