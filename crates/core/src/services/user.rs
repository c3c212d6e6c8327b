//! User service.

use std::sync::{Arc, LazyLock};

use chrono::{Duration, NaiveDate, Utc};
use points_common::config::RegistrationConfig;
use points_common::{AppError, AppResult, IdGenerator, Page, Pagination};
use points_db::db_error;
use points_db::entities::user::{self, UserRole};
use points_db::repositories::{PromotionRepository, UserFilter, UserRepository};
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    prelude::DateTimeWithTimeZone,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::{Validate, ValidationError};

use super::{begin, load_actor, now, user_by_id};
use crate::policy;

static UTORID_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[a-z0-9]{7,8}$").unwrap()
});

/// Institutional mail domain every account must use.
pub const EMAIL_DOMAIN: &str = "@mail.utoronto.ca";

fn validate_utorid(utorid: &str) -> Result<(), ValidationError> {
    if UTORID_RE.is_match(utorid) {
        Ok(())
    } else {
        Err(ValidationError::new("utorid"))
    }
}

fn validate_email_domain(email: &str) -> Result<(), ValidationError> {
    if email.ends_with(EMAIL_DOMAIN) && email.len() > EMAIL_DOMAIN.len() {
        Ok(())
    } else {
        Err(ValidationError::new("email_domain"))
    }
}

/// Input for registering a user.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserInput {
    #[validate(custom(function = "validate_utorid"))]
    pub utorid: String,
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(email, custom(function = "validate_email_domain"))]
    pub email: String,
}

/// Input for editing one's own profile.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeInput {
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    #[validate(email, custom(function = "validate_email_domain"))]
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
    #[validate(length(max = 1024))]
    pub avatar_url: Option<String>,
}

/// Input for a manager editing a user.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    #[validate(email, custom(function = "validate_email_domain"))]
    pub email: Option<String>,
    pub verified: Option<bool>,
    pub suspicious: Option<bool>,
    pub role: Option<UserRole>,
}

/// A freshly registered user together with the token used to set a password.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(flatten)]
    pub user: user::Model,
    pub reset_token: String,
    pub expires_at: DateTimeWithTimeZone,
}

/// A user with promotion ids attached.
///
/// For cashiers the ids are the one-time promotions still available to the
/// user; for managers and the user themself, the ones already used.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: user::Model,
    pub promotions: Vec<i32>,
}

/// Service for managing users.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    user_repo: UserRepository,
    promotion_repo: PromotionRepository,
    id_gen: IdGenerator,
    reset_token_ttl: Duration,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, registration: &RegistrationConfig) -> Self {
        Self {
            user_repo: UserRepository::new(Arc::clone(&db)),
            promotion_repo: PromotionRepository::new(Arc::clone(&db)),
            db,
            id_gen: IdGenerator::new(),
            reset_token_ttl: Duration::hours(registration.reset_token_ttl_hours),
        }
    }

    // ==================== Registration ====================

    /// Register a new regular user. Cashiers and above only.
    pub async fn register(
        &self,
        actor_id: i32,
        input: RegisterUserInput,
    ) -> AppResult<Registration> {
        input.validate()?;

        let actor = load_actor(self.db.as_ref(), actor_id).await?;
        policy::require_role(&actor, UserRole::Cashier)?;

        self.ensure_unique(&input.utorid, &input.email).await?;

        let token = self.id_gen.generate_token();
        let expires_at: DateTimeWithTimeZone = (Utc::now() + self.reset_token_ttl).into();

        let model = user::ActiveModel {
            utorid: Set(input.utorid),
            email: Set(input.email),
            name: Set(input.name),
            birthday: Set(None),
            role: Set(UserRole::Regular),
            points: Set(0),
            verified: Set(false),
            suspicious: Set(false),
            avatar_url: Set(None),
            reset_token: Set(Some(token.clone())),
            reset_expires_at: Set(Some(expires_at)),
            last_login: Set(None),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(db_error)?;

        info!(actor_id, user_id = model.id, utorid = %model.utorid, "Registered user");

        Ok(Registration {
            user: model,
            reset_token: token,
            expires_at,
        })
    }

    /// Create a verified superuser without an acting user.
    pub async fn bootstrap_superuser(&self, input: RegisterUserInput) -> AppResult<user::Model> {
        input.validate()?;
        self.ensure_unique(&input.utorid, &input.email).await?;

        let model = user::ActiveModel {
            utorid: Set(input.utorid),
            email: Set(input.email),
            name: Set(input.name),
            birthday: Set(None),
            role: Set(UserRole::Superuser),
            points: Set(0),
            verified: Set(true),
            suspicious: Set(false),
            avatar_url: Set(None),
            reset_token: Set(None),
            reset_expires_at: Set(None),
            last_login: Set(None),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(db_error)?;

        info!(user_id = model.id, utorid = %model.utorid, "Created superuser");
        Ok(model)
    }

    /// Stamp a successful login; `activated` listings key off this.
    pub async fn record_login(&self, user_id: i32) -> AppResult<user::Model> {
        let found = user_by_id(self.db.as_ref(), user_id).await?;
        let mut active: user::ActiveModel = found.into();
        active.last_login = Set(Some(now()));
        active.update(self.db.as_ref()).await.map_err(db_error)
    }

    // ==================== Lookup ====================

    /// View a user. Cashiers and above only.
    pub async fn get_user(&self, actor_id: i32, user_id: i32) -> AppResult<UserDetail> {
        let actor = load_actor(self.db.as_ref(), actor_id).await?;
        policy::require_role(&actor, UserRole::Cashier)?;

        let target = self.user_repo.get_by_id(user_id).await?;

        let promotions = if actor.role.is_privileged() {
            self.user_repo.used_promotion_ids(target.id).await?
        } else {
            self.promotion_repo
                .find_available_one_time(target.id, now())
                .await?
                .into_iter()
                .map(|p| p.id)
                .collect()
        };

        Ok(UserDetail {
            user: target,
            promotions,
        })
    }

    /// The acting user's own record.
    pub async fn get_me(&self, actor_id: i32) -> AppResult<UserDetail> {
        let me = load_actor(self.db.as_ref(), actor_id).await?;
        let promotions = self.user_repo.used_promotion_ids(me.id).await?;
        Ok(UserDetail {
            user: me,
            promotions,
        })
    }

    /// List users. Managers and above only.
    pub async fn list(
        &self,
        actor_id: i32,
        filter: UserFilter,
        pagination: Pagination,
    ) -> AppResult<Page<user::Model>> {
        pagination.validate()?;
        let actor = load_actor(self.db.as_ref(), actor_id).await?;
        policy::require_role(&actor, UserRole::Manager)?;

        self.user_repo.list(&filter, pagination).await
    }

    // ==================== Updates ====================

    /// Edit the acting user's own profile.
    pub async fn update_me(&self, actor_id: i32, input: UpdateMeInput) -> AppResult<user::Model> {
        input.validate()?;
        if input.name.is_none()
            && input.email.is_none()
            && input.birthday.is_none()
            && input.avatar_url.is_none()
        {
            return Err(AppError::invalid("no fields to update"));
        }

        let me = load_actor(self.db.as_ref(), actor_id).await?;
        if let Some(email) = &input.email {
            self.ensure_email_free(email, Some(me.id)).await?;
        }

        let mut active: user::ActiveModel = me.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(email) = input.email {
            active.email = Set(email);
        }
        if let Some(birthday) = input.birthday {
            active.birthday = Set(Some(birthday));
        }
        if let Some(avatar_url) = input.avatar_url {
            active.avatar_url = Set(Some(avatar_url));
        }

        let updated = active.update(self.db.as_ref()).await.map_err(db_error)?;
        info!(user_id = updated.id, "Updated own profile");
        Ok(updated)
    }

    /// Edit another user. Managers and above only.
    pub async fn update_user(
        &self,
        actor_id: i32,
        user_id: i32,
        input: UpdateUserInput,
    ) -> AppResult<user::Model> {
        input.validate()?;
        if input.email.is_none()
            && input.verified.is_none()
            && input.suspicious.is_none()
            && input.role.is_none()
        {
            return Err(AppError::invalid("no fields to update"));
        }
        if input.verified == Some(false) {
            return Err(AppError::invalid("verified can only be set to true"));
        }

        let txn = begin(self.db.as_ref()).await?;

        let actor = load_actor(&txn, actor_id).await?;
        policy::require_role(&actor, UserRole::Manager)?;
        let target = user_by_id(&txn, user_id).await?;

        if let Some(role) = input.role {
            policy::check_role_change(&actor, &target, role).inspect_err(|e| {
                debug!(actor_id, user_id, role = %role, error = %e, "Role change rejected");
            })?;
        }
        if let Some(email) = &input.email {
            let taken = user::Entity::find()
                .filter(user::Column::Email.eq(email.as_str()))
                .filter(user::Column::Id.ne(user_id))
                .one(&txn)
                .await
                .map_err(db_error)?;
            if taken.is_some() {
                return Err(AppError::Conflict(format!("email {email} is already in use")));
            }
        }

        let mut active: user::ActiveModel = target.into();
        if let Some(email) = input.email {
            active.email = Set(email);
        }
        if input.verified == Some(true) {
            active.verified = Set(true);
        }
        if let Some(suspicious) = input.suspicious {
            active.suspicious = Set(suspicious);
        }
        if let Some(role) = input.role {
            active.role = Set(role);
        }

        let updated = active.update(&txn).await.map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        info!(
            actor_id,
            user_id,
            role = %updated.role,
            suspicious = updated.suspicious,
            "Updated user"
        );
        Ok(updated)
    }

    /// Change a user's role.
    pub async fn update_role(
        &self,
        actor_id: i32,
        user_id: i32,
        role: UserRole,
    ) -> AppResult<user::Model> {
        self.update_user(
            actor_id,
            user_id,
            UpdateUserInput {
                role: Some(role),
                ..Default::default()
            },
        )
        .await
    }

    // ==================== Helpers ====================

    async fn ensure_unique(&self, utorid: &str, email: &str) -> AppResult<()> {
        if self.user_repo.find_by_utorid(utorid).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "utorid {utorid} is already registered"
            )));
        }
        self.ensure_email_free(email, None).await
    }

    async fn ensure_email_free(&self, email: &str, owner_id: Option<i32>) -> AppResult<()> {
        let mut query = user::Entity::find().filter(user::Column::Email.eq(email));
        if let Some(owner_id) = owner_id {
            query = query.filter(user::Column::Id.ne(owner_id));
        }

        if query.one(self.db.as_ref()).await.map_err(db_error)?.is_some() {
            return Err(AppError::Conflict(format!("email {email} is already in use")));
        }
        Ok(())
    }
}
