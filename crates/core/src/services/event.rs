//! Event service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use points_common::{AppError, AppResult, Page, Pagination};
use points_db::db_error;
use points_db::entities::user::{self, UserRole};
use points_db::entities::{Event, EventGuest, EventOrganizer, event, event_guest, event_organizer};
use points_db::repositories::{EventFilter, EventRepository};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};
use validator::Validate;

use super::{begin, load_actor, now, user_by_id, user_by_utorid};
use crate::{budget, policy};

/// Input for creating an event.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventInput {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(length(min = 1, max = 4096))]
    pub description: String,
    #[validate(length(min = 1, max = 256))]
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(range(min = 0))]
    pub capacity: Option<i32>,
    #[validate(range(min = 0))]
    pub points: i32,
}

/// Input for updating an event. Absent fields are left alone.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventInput {
    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 4096))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 256))]
    pub location: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// `Some(None)` (an explicit `null`) removes the limit.
    #[allow(clippy::option_option)]
    #[serde(default, deserialize_with = "explicit_null")]
    pub capacity: Option<Option<i32>>,
    /// New total point budget.
    pub points: Option<i32>,
    pub published: Option<bool>,
}

/// Keep an explicit `null` apart from an absent field.
#[allow(clippy::option_option)]
fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<i32>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i32>::deserialize(deserializer).map(Some)
}

impl UpdateEventInput {
    fn check_capacity(&self) -> AppResult<()> {
        if matches!(self.capacity, Some(Some(capacity)) if capacity < 0) {
            return Err(AppError::invalid("capacity must not be negative"));
        }
        Ok(())
    }

    const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.capacity.is_none()
            && self.points.is_none()
            && self.published.is_none()
    }

    /// Fields that freeze once the event has started.
    const fn touches_details(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.location.is_some()
            || self.start_time.is_some()
            || self.capacity.is_some()
    }
}

/// Listing query for events.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    pub name: Option<String>,
    pub location: Option<String>,
    pub started: Option<bool>,
    pub ended: Option<bool>,
    #[serde(default)]
    pub show_full: bool,
    pub published: Option<bool>,
}

/// Public view of a user inside an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i32,
    pub utorid: String,
    pub name: String,
}

impl From<user::Model> for UserSummary {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            utorid: user.utorid,
            name: user.name,
        }
    }
}

/// An event with its people.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: event::Model,
    pub organizers: Vec<UserSummary>,
    /// Empty unless the viewer manages the event.
    pub guests: Vec<UserSummary>,
    pub num_guests: u64,
}

/// Result of putting someone on a guest list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestAdded {
    pub id: i32,
    pub name: String,
    pub location: String,
    pub guest_added: UserSummary,
    pub num_guests: u64,
}

// ==================== Helpers ====================

async fn event_in<C: ConnectionTrait>(conn: &C, event_id: i32) -> AppResult<event::Model> {
    Event::find_by_id(event_id)
        .one(conn)
        .await
        .map_err(db_error)?
        .ok_or_else(|| AppError::not_found(format!("event {event_id}")))
}

async fn organizes<C: ConnectionTrait>(conn: &C, event_id: i32, user_id: i32) -> AppResult<bool> {
    EventOrganizer::find_by_id((event_id, user_id))
        .one(conn)
        .await
        .map(|row| row.is_some())
        .map_err(db_error)
}

async fn attends<C: ConnectionTrait>(conn: &C, event_id: i32, user_id: i32) -> AppResult<bool> {
    EventGuest::find_by_id((event_id, user_id))
        .one(conn)
        .await
        .map(|row| row.is_some())
        .map_err(db_error)
}

async fn count_guests<C: ConnectionTrait>(conn: &C, event_id: i32) -> AppResult<u64> {
    EventGuest::find()
        .filter(event_guest::Column::EventId.eq(event_id))
        .count(conn)
        .await
        .map_err(db_error)
}

/// IDs of the guests of an event, ordered.
pub(crate) async fn guest_ids<C: ConnectionTrait>(conn: &C, event_id: i32) -> AppResult<Vec<i32>> {
    EventGuest::find()
        .filter(event_guest::Column::EventId.eq(event_id))
        .select_only()
        .column(event_guest::Column::UserId)
        .order_by_asc(event_guest::Column::UserId)
        .into_tuple::<i32>()
        .all(conn)
        .await
        .map_err(db_error)
}

/// Seat a guest: the event must not have ended and must have space.
async fn seat_guest<C: ConnectionTrait>(
    conn: &C,
    event: &event::Model,
    guest: &user::Model,
) -> AppResult<()> {
    if event.has_ended_at(now()) {
        return Err(AppError::Gone(format!("event {} has ended", event.id)));
    }
    budget::reserve_seat(conn, event.id).await?;

    event_guest::ActiveModel {
        event_id: Set(event.id),
        user_id: Set(guest.id),
        added_at: Set(now()),
    }
    .insert(conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

/// Remove a guest and give the seat back. `NotFound` if they were not a guest.
async fn unseat_guest<C: ConnectionTrait>(conn: &C, event_id: i32, user_id: i32) -> AppResult<()> {
    let result = EventGuest::delete_many()
        .filter(event_guest::Column::EventId.eq(event_id))
        .filter(event_guest::Column::UserId.eq(user_id))
        .exec(conn)
        .await
        .map_err(db_error)?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found(format!(
            "user {user_id} is not a guest of event {event_id}"
        )));
    }
    budget::release_seat(conn, event_id).await
}

fn check_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    current: DateTime<Utc>,
) -> AppResult<()> {
    if start < current {
        return Err(AppError::invalid("start time must not be in the past"));
    }
    if end <= start {
        return Err(AppError::invalid("end time must be after start time"));
    }
    Ok(())
}

// ==================== Service ====================

/// Service for events, their organizers and guests.
#[derive(Clone)]
pub struct EventService {
    db: Arc<DatabaseConnection>,
    event_repo: EventRepository,
}

impl EventService {
    /// Create a new event service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            event_repo: EventRepository::new(Arc::clone(&db)),
            db,
        }
    }

    /// Create an unpublished event. Managers and above only.
    pub async fn create(&self, actor_id: i32, input: CreateEventInput) -> AppResult<event::Model> {
        input.validate()?;
        let actor = load_actor(self.db.as_ref(), actor_id).await?;
        policy::require_role(&actor, UserRole::Manager)?;
        check_window(input.start_time, input.end_time, Utc::now())?;

        let model = event::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            location: Set(input.location),
            start_time: Set(input.start_time.into()),
            end_time: Set(input.end_time.into()),
            capacity: Set(input.capacity),
            space_remain: Set(input.capacity),
            points_remain: Set(input.points),
            points_awarded: Set(0),
            published: Set(false),
            created_at: Set(now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .map_err(db_error)?;

        info!(actor_id, event_id = model.id, "Created event");
        Ok(model)
    }

    /// List events. Below manager only published events are visible.
    pub async fn list(
        &self,
        actor_id: i32,
        query: EventQuery,
        pagination: Pagination,
    ) -> AppResult<Page<event::Model>> {
        pagination.validate()?;
        if query.started.is_some() && query.ended.is_some() {
            return Err(AppError::invalid("started and ended cannot be combined"));
        }

        let actor = load_actor(self.db.as_ref(), actor_id).await?;
        let published = if actor.role.is_privileged() {
            query.published
        } else if query.published.is_some() {
            return Err(AppError::invalid("published filter is not available"));
        } else {
            Some(true)
        };

        let filter = EventFilter {
            name: query.name,
            location: query.location,
            started: query.started,
            ended: query.ended,
            show_full: query.show_full,
            published,
        };
        self.event_repo.list(&filter, now(), pagination).await
    }

    /// View an event with its organizers, and its guests if the viewer
    /// manages it.
    pub async fn get(&self, actor_id: i32, event_id: i32) -> AppResult<EventDetail> {
        let actor = load_actor(self.db.as_ref(), actor_id).await?;
        let event = self.event_repo.get_by_id(event_id).await?;
        let is_organizer = self.event_repo.is_organizer(event_id, actor.id).await?;

        if !policy::can_see_event(actor.role, is_organizer, event.published) {
            return Err(AppError::not_found(format!("event {event_id}")));
        }

        let organizers = self.event_repo.organizers(event_id).await?;
        let (guests, num_guests) = if policy::can_manage_event(actor.role, is_organizer) {
            let guests = self.event_repo.guests(event_id).await?;
            let count = guests.len() as u64;
            (guests.into_iter().map(UserSummary::from).collect(), count)
        } else {
            (Vec::new(), self.event_repo.guest_count(event_id).await?)
        };

        Ok(EventDetail {
            event,
            organizers: organizers.into_iter().map(UserSummary::from).collect(),
            guests,
            num_guests,
        })
    }

    /// Update an event. Organizers may edit details; the point budget and
    /// publication are for managers.
    pub async fn update(
        &self,
        actor_id: i32,
        event_id: i32,
        input: UpdateEventInput,
    ) -> AppResult<event::Model> {
        input.validate()?;
        input.check_capacity()?;
        if input.is_empty() {
            return Err(AppError::invalid("no fields to update"));
        }

        let txn = begin(self.db.as_ref()).await?;
        let actor = load_actor(&txn, actor_id).await?;
        let existing = event_in(&txn, event_id).await?;
        let is_organizer = organizes(&txn, event_id, actor.id).await?;

        if !policy::can_see_event(actor.role, is_organizer, existing.published) {
            return Err(AppError::not_found(format!("event {event_id}")));
        }
        if !policy::can_manage_event(actor.role, is_organizer) {
            return Err(AppError::forbidden("only organizers and managers may edit an event"));
        }
        if (input.points.is_some() || input.published.is_some()) && !actor.role.is_privileged() {
            return Err(AppError::forbidden(
                "only managers may change the point budget or publish",
            ));
        }
        if input.published == Some(false) {
            return Err(AppError::invalid("published can only be set to true"));
        }

        let current = now();
        if existing.has_started_at(current) && input.touches_details() {
            return Err(AppError::invalid(
                "name, description, location, start time and capacity are fixed once the event starts",
            ));
        }
        if existing.has_ended_at(current) && input.end_time.is_some() {
            return Err(AppError::invalid("end time is fixed once the event ends"));
        }

        let start = input.start_time.map_or(existing.start_time, Into::into);
        let end = input.end_time.map_or(existing.end_time, Into::into);
        if input.start_time.is_some() && start < current {
            return Err(AppError::invalid("start time must not be in the past"));
        }
        if input.end_time.is_some() && end < current {
            return Err(AppError::invalid("end time must not be in the past"));
        }
        if end <= start {
            return Err(AppError::invalid("end time must be after start time"));
        }

        let space_remain = match input.capacity {
            Some(capacity) => {
                let guests = count_guests(&txn, event_id).await?;
                Some(budget::resize(capacity, guests)?)
            }
            None => None,
        };
        let points_remain = input
            .points
            .map(|total| budget::rebudget(&existing, total))
            .transpose()?;

        let mut active: event::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(location) = input.location {
            active.location = Set(location);
        }
        if input.start_time.is_some() {
            active.start_time = Set(start);
        }
        if input.end_time.is_some() {
            active.end_time = Set(end);
        }
        if let Some(space_remain) = space_remain {
            active.capacity = Set(input.capacity.flatten());
            active.space_remain = Set(space_remain);
        }
        if let Some(points_remain) = points_remain {
            active.points_remain = Set(points_remain);
        }
        if input.published == Some(true) {
            active.published = Set(true);
        }

        let updated = active.update(&txn).await.map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        info!(actor_id, event_id, "Updated event");
        Ok(updated)
    }

    /// Delete an event that has not been published. Managers and above only.
    pub async fn delete(&self, actor_id: i32, event_id: i32) -> AppResult<()> {
        let txn = begin(self.db.as_ref()).await?;
        let actor = load_actor(&txn, actor_id).await?;
        policy::require_role(&actor, UserRole::Manager)?;

        let existing = event_in(&txn, event_id).await?;
        if existing.published {
            return Err(AppError::forbidden("a published event cannot be deleted"));
        }

        Event::delete_by_id(event_id)
            .exec(&txn)
            .await
            .map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        info!(actor_id, event_id, "Deleted event");
        Ok(())
    }

    // ==================== Organizers ====================

    /// Make a user an organizer. Managers and above only.
    pub async fn add_organizer(
        &self,
        actor_id: i32,
        event_id: i32,
        utorid: &str,
    ) -> AppResult<EventDetail> {
        let txn = begin(self.db.as_ref()).await?;
        let actor = load_actor(&txn, actor_id).await?;
        policy::require_role(&actor, UserRole::Manager)?;

        let event = event_in(&txn, event_id).await?;
        let organizer = user_by_utorid(&txn, utorid).await?;

        if event.has_ended_at(now()) {
            return Err(AppError::Gone(format!("event {event_id} has ended")));
        }
        if attends(&txn, event_id, organizer.id).await? {
            return Err(AppError::invalid(format!(
                "{utorid} is a guest of event {event_id} and cannot organize it"
            )));
        }
        if !organizes(&txn, event_id, organizer.id).await? {
            event_organizer::ActiveModel {
                event_id: Set(event_id),
                user_id: Set(organizer.id),
                added_at: Set(now()),
            }
            .insert(&txn)
            .await
            .map_err(db_error)?;
        }
        txn.commit().await.map_err(db_error)?;

        info!(actor_id, event_id, organizer_id = organizer.id, "Added organizer");
        self.get(actor_id, event_id).await
    }

    /// Remove an organizer. Managers and above only.
    pub async fn remove_organizer(
        &self,
        actor_id: i32,
        event_id: i32,
        user_id: i32,
    ) -> AppResult<()> {
        let txn = begin(self.db.as_ref()).await?;
        let actor = load_actor(&txn, actor_id).await?;
        policy::require_role(&actor, UserRole::Manager)?;
        event_in(&txn, event_id).await?;

        let result = EventOrganizer::delete_many()
            .filter(event_organizer::Column::EventId.eq(event_id))
            .filter(event_organizer::Column::UserId.eq(user_id))
            .exec(&txn)
            .await
            .map_err(db_error)?;
        if result.rows_affected == 0 {
            return Err(AppError::not_found(format!(
                "user {user_id} does not organize event {event_id}"
            )));
        }
        txn.commit().await.map_err(db_error)?;

        info!(actor_id, event_id, organizer_id = user_id, "Removed organizer");
        Ok(())
    }

    // ==================== Guests ====================

    /// Put a user on the guest list. Organizers and managers only.
    ///
    /// Adding someone who is already a guest leaves the event unchanged.
    pub async fn add_guest(
        &self,
        actor_id: i32,
        event_id: i32,
        utorid: &str,
    ) -> AppResult<GuestAdded> {
        let txn = begin(self.db.as_ref()).await?;
        let actor = load_actor(&txn, actor_id).await?;
        let event = event_in(&txn, event_id).await?;
        let is_organizer = organizes(&txn, event_id, actor.id).await?;

        if !policy::can_see_event(actor.role, is_organizer, event.published) {
            return Err(AppError::not_found(format!("event {event_id}")));
        }
        if !policy::can_manage_event(actor.role, is_organizer) {
            return Err(AppError::forbidden("only organizers and managers may add guests"));
        }

        let guest = user_by_utorid(&txn, utorid).await?;
        if organizes(&txn, event_id, guest.id).await? {
            return Err(AppError::invalid(format!(
                "{utorid} organizes event {event_id} and cannot be a guest"
            )));
        }
        if attends(&txn, event_id, guest.id).await? {
            debug!(event_id, guest_id = guest.id, "Guest already on the list");
        } else {
            seat_guest(&txn, &event, &guest).await?;
        }

        let num_guests = count_guests(&txn, event_id).await?;
        txn.commit().await.map_err(db_error)?;

        info!(actor_id, event_id, guest_id = guest.id, num_guests, "Added guest");
        Ok(GuestAdded {
            id: event.id,
            name: event.name,
            location: event.location,
            guest_added: guest.into(),
            num_guests,
        })
    }

    /// Take a user off the guest list. Managers and above only.
    pub async fn remove_guest(&self, actor_id: i32, event_id: i32, user_id: i32) -> AppResult<()> {
        let txn = begin(self.db.as_ref()).await?;
        let actor = load_actor(&txn, actor_id).await?;
        policy::require_role(&actor, UserRole::Manager)?;
        event_in(&txn, event_id).await?;
        user_by_id(&txn, user_id).await?;

        unseat_guest(&txn, event_id, user_id).await?;
        txn.commit().await.map_err(db_error)?;

        info!(actor_id, event_id, guest_id = user_id, "Removed guest");
        Ok(())
    }

    /// RSVP to a published event.
    pub async fn rsvp(&self, actor_id: i32, event_id: i32) -> AppResult<GuestAdded> {
        let txn = begin(self.db.as_ref()).await?;
        let actor = load_actor(&txn, actor_id).await?;
        let event = event_in(&txn, event_id).await?;

        if !event.published {
            return Err(AppError::not_found(format!("event {event_id}")));
        }
        if organizes(&txn, event_id, actor.id).await? {
            return Err(AppError::invalid("organizers cannot RSVP to their own event"));
        }
        if attends(&txn, event_id, actor.id).await? {
            return Err(AppError::invalid(format!(
                "already on the guest list of event {event_id}"
            )));
        }
        seat_guest(&txn, &event, &actor).await?;

        let num_guests = count_guests(&txn, event_id).await?;
        txn.commit().await.map_err(db_error)?;

        info!(event_id, guest_id = actor.id, num_guests, "RSVP recorded");
        Ok(GuestAdded {
            id: event.id,
            name: event.name,
            location: event.location,
            guest_added: actor.into(),
            num_guests,
        })
    }

    /// Withdraw one's own RSVP before the event ends.
    pub async fn cancel_rsvp(&self, actor_id: i32, event_id: i32) -> AppResult<()> {
        let txn = begin(self.db.as_ref()).await?;
        let actor = load_actor(&txn, actor_id).await?;
        let event = event_in(&txn, event_id).await?;

        if !attends(&txn, event_id, actor.id).await? {
            return Err(AppError::not_found(format!(
                "not on the guest list of event {event_id}"
            )));
        }
        if event.has_ended_at(now()) {
            return Err(AppError::Gone(format!("event {event_id} has ended")));
        }

        unseat_guest(&txn, event_id, actor.id).await?;
        txn.commit().await.map_err(db_error)?;

        info!(event_id, guest_id = actor.id, "RSVP cancelled");
        Ok(())
    }
}
