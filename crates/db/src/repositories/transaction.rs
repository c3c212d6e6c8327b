//! Point transaction repository.

use std::collections::HashMap;
use std::sync::Arc;

use crate::db_error;
use crate::entities::{
    PointTransaction, TransactionPromotion, User, point_transaction,
    point_transaction::TransactionKind, transaction_promotion, user,
};
use points_common::{AppError, AppResult, Page, Pagination};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, QueryTrait, Select,
};

/// Comparison applied to a transaction's point amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountFilter {
    /// `points >= n`
    AtLeast(i32),
    /// `points <= n`
    AtMost(i32),
}

/// Filters accepted by the transaction listings.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Substring of the owner's utorid or display name.
    pub name: Option<String>,
    /// Exact owner utorid (used for a user's own history).
    pub utorid: Option<String>,
    /// Substring of the creator's utorid.
    pub created_by: Option<String>,
    /// Review flag.
    pub suspicious: Option<bool>,
    /// Transactions citing this promotion.
    pub promotion_id: Option<i32>,
    /// Transaction kind.
    pub kind: Option<TransactionKind>,
    /// Exact related ID; only meaningful together with `kind`.
    pub related_id: Option<i32>,
    /// Bound on the signed point amount.
    pub amount: Option<AmountFilter>,
}

/// Point transaction repository for read-side database operations.
#[derive(Clone)]
pub struct TransactionRepository {
    db: Arc<DatabaseConnection>,
}

impl TransactionRepository {
    /// Create a new transaction repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a transaction by ID.
    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<point_transaction::Model>> {
        PointTransaction::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Find a transaction by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i32) -> AppResult<point_transaction::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("transaction {id}")))
    }

    /// Promotion IDs cited by one transaction.
    pub async fn promotion_ids(&self, transaction_id: i32) -> AppResult<Vec<i32>> {
        Ok(self
            .promotion_ids_for(&[transaction_id])
            .await?
            .remove(&transaction_id)
            .unwrap_or_default())
    }

    /// Promotion IDs cited by each of the given transactions.
    pub async fn promotion_ids_for(
        &self,
        transaction_ids: &[i32],
    ) -> AppResult<HashMap<i32, Vec<i32>>> {
        if transaction_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = TransactionPromotion::find()
            .filter(transaction_promotion::Column::TransactionId.is_in(transaction_ids.to_vec()))
            .order_by_asc(transaction_promotion::Column::PromotionId)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)?;

        let mut by_transaction: HashMap<i32, Vec<i32>> = HashMap::new();
        for row in rows {
            by_transaction
                .entry(row.transaction_id)
                .or_default()
                .push(row.promotion_id);
        }
        Ok(by_transaction)
    }

    /// List transactions matching a filter, ordered by ID.
    pub async fn list(
        &self,
        filter: &TransactionFilter,
        pagination: Pagination,
    ) -> AppResult<Page<point_transaction::Model>> {
        let query = Self::filtered(filter);

        let count = query
            .clone()
            .count(self.db.as_ref())
            .await
            .map_err(db_error)?;

        let results = query
            .order_by_asc(point_transaction::Column::Id)
            .offset(pagination.offset())
            .limit(pagination.limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)?;

        Ok(Page { count, results })
    }

    fn filtered(filter: &TransactionFilter) -> Select<PointTransaction> {
        let mut condition = Condition::all();

        if let Some(name) = &filter.name {
            let named = User::find()
                .select_only()
                .column(user::Column::Utorid)
                .filter(user::Column::Name.contains(name))
                .into_query();
            condition = condition.add(
                Condition::any()
                    .add(point_transaction::Column::Utorid.contains(name))
                    .add(point_transaction::Column::Utorid.in_subquery(named)),
            );
        }
        if let Some(utorid) = &filter.utorid {
            condition = condition.add(point_transaction::Column::Utorid.eq(utorid.as_str()));
        }
        if let Some(created_by) = &filter.created_by {
            condition = condition.add(point_transaction::Column::CreatedBy.contains(created_by));
        }
        if let Some(suspicious) = filter.suspicious {
            condition = condition.add(point_transaction::Column::Suspicious.eq(suspicious));
        }
        if let Some(promotion_id) = filter.promotion_id {
            let citing = TransactionPromotion::find()
                .select_only()
                .column(transaction_promotion::Column::TransactionId)
                .filter(transaction_promotion::Column::PromotionId.eq(promotion_id))
                .into_query();
            condition = condition.add(point_transaction::Column::Id.in_subquery(citing));
        }
        if let Some(kind) = filter.kind {
            condition = condition.add(point_transaction::Column::Kind.eq(kind));
        }
        if let Some(related_id) = filter.related_id {
            condition = condition.add(point_transaction::Column::RelatedId.eq(related_id));
        }
        match filter.amount {
            Some(AmountFilter::AtLeast(n)) => {
                condition = condition.add(point_transaction::Column::Points.gte(n));
            }
            Some(AmountFilter::AtMost(n)) => {
                condition = condition.add(point_transaction::Column::Points.lte(n));
            }
            None => {}
        }

        PointTransaction::find().filter(condition)
    }
}
