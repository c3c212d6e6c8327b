//! User repository.

use std::sync::Arc;

use crate::db_error;
use crate::entities::{User, UserPromotion, user, user::UserRole, user_promotion};
use points_common::{AppError, AppResult, Page, Pagination};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select,
};

/// Filters accepted by the user listing.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Substring of the utorid or the display name.
    pub name: Option<String>,
    /// Exact role.
    pub role: Option<UserRole>,
    /// Verification status.
    pub verified: Option<bool>,
    /// `true` for users who have logged in at least once.
    pub activated: Option<bool>,
}

/// User repository for read-side database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Find a user by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i32) -> AppResult<user::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {id}")))
    }

    /// Find a user by utorid.
    pub async fn find_by_utorid(&self, utorid: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Utorid.eq(utorid))
            .one(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Find a user by utorid, returning an error if not found.
    pub async fn get_by_utorid(&self, utorid: &str) -> AppResult<user::Model> {
        self.find_by_utorid(utorid)
            .await?
            .ok_or_else(|| AppError::not_found(format!("user {utorid}")))
    }

    /// Find users by IDs.
    pub async fn find_by_ids(&self, ids: &[i32]) -> AppResult<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        User::find()
            .filter(user::Column::Id.is_in(ids.to_vec()))
            .order_by_asc(user::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// IDs of the one-time promotions a user has consumed.
    pub async fn used_promotion_ids(&self, user_id: i32) -> AppResult<Vec<i32>> {
        UserPromotion::find()
            .filter(user_promotion::Column::UserId.eq(user_id))
            .select_only()
            .column(user_promotion::Column::PromotionId)
            .order_by_asc(user_promotion::Column::PromotionId)
            .into_tuple::<i32>()
            .all(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Count users holding a role.
    pub async fn count_by_role(&self, role: UserRole) -> AppResult<u64> {
        User::find()
            .filter(user::Column::Role.eq(role))
            .count(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// List users matching a filter, ordered by ID.
    pub async fn list(
        &self,
        filter: &UserFilter,
        pagination: Pagination,
    ) -> AppResult<Page<user::Model>> {
        let query = Self::filtered(filter);

        let count = query
            .clone()
            .count(self.db.as_ref())
            .await
            .map_err(db_error)?;

        let results = query
            .order_by_asc(user::Column::Id)
            .offset(pagination.offset())
            .limit(pagination.limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)?;

        Ok(Page { count, results })
    }

    fn filtered(filter: &UserFilter) -> Select<User> {
        let mut condition = Condition::all();

        if let Some(name) = &filter.name {
            condition = condition.add(
                Condition::any()
                    .add(user::Column::Utorid.contains(name))
                    .add(user::Column::Name.contains(name)),
            );
        }
        if let Some(role) = filter.role {
            condition = condition.add(user::Column::Role.eq(role));
        }
        if let Some(verified) = filter.verified {
            condition = condition.add(user::Column::Verified.eq(verified));
        }
        if let Some(activated) = filter.activated {
            condition = condition.add(if activated {
                user::Column::LastLogin.is_not_null()
            } else {
                user::Column::LastLogin.is_null()
            });
        }

        User::find().filter(condition)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, Value};
    use std::sync::Arc;

    fn create_test_user(id: i32, utorid: &str) -> user::Model {
        user::Model {
            id,
            utorid: utorid.to_string(),
            email: format!("{utorid}@mail.utoronto.ca"),
            name: "Test User".to_string(),
            birthday: None,
            role: UserRole::Regular,
            points: 0,
            verified: false,
            suspicious: false,
            avatar_url: None,
            reset_token: None,
            reset_expires_at: None,
            last_login: None,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_id_found() {
        let user = create_test_user(1, "testuser");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user.clone()]])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let result = repo.find_by_id(1).await.unwrap();

        let found_user = result.unwrap();
        assert_eq!(found_user.id, 1);
        assert_eq!(found_user.utorid, "testuser");
    }

    #[tokio::test]
    async fn test_get_by_utorid_not_found_returns_error() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let result = repo.get_by_utorid("nobody01").await;

        match result {
            Err(AppError::NotFound(what)) => assert!(what.contains("nobody01")),
            other => panic!("Expected NotFound error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_find_by_ids_empty_skips_query() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = UserRepository::new(db);
        let result = repo.find_by_ids(&[]).await.unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_list_returns_count_and_page() {
        let user1 = create_test_user(1, "user0001");
        let user2 = create_test_user(2, "user0002");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => Value::BigInt(Some(12)),
                }]])
                .append_query_results([[user1, user2]])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let filter = UserFilter {
            role: Some(UserRole::Regular),
            ..Default::default()
        };
        let page = repo.list(&filter, Pagination::default()).await.unwrap();

        assert_eq!(page.count, 12);
        assert_eq!(page.results.len(), 2);
    }
}
