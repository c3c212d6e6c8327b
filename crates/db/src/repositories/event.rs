//! Event repository.

use std::sync::Arc;

use crate::db_error;
use crate::entities::{
    Event, EventGuest, EventOrganizer, User, event, event_guest, event_organizer, user,
};
use points_common::{AppError, AppResult, Page, Pagination};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Select, prelude::DateTimeWithTimeZone,
};

/// Filters accepted by the event listing.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Substring of the event name.
    pub name: Option<String>,
    /// Substring of the location.
    pub location: Option<String>,
    /// `Some(true)` keeps events whose start time has passed.
    pub started: Option<bool>,
    /// `Some(true)` keeps events whose end time has passed.
    pub ended: Option<bool>,
    /// Include events with no space left.
    pub show_full: bool,
    /// Publication status.
    pub published: Option<bool>,
}

/// Event repository for read-side database operations.
#[derive(Clone)]
pub struct EventRepository {
    db: Arc<DatabaseConnection>,
}

impl EventRepository {
    /// Create a new event repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an event by ID.
    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<event::Model>> {
        Event::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Find an event by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: i32) -> AppResult<event::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("event {id}")))
    }

    /// Users on the guest list, ordered by ID.
    pub async fn guests(&self, event_id: i32) -> AppResult<Vec<user::Model>> {
        User::find()
            .inner_join(EventGuest)
            .filter(event_guest::Column::EventId.eq(event_id))
            .order_by_asc(user::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Users organizing the event, ordered by ID.
    pub async fn organizers(&self, event_id: i32) -> AppResult<Vec<user::Model>> {
        User::find()
            .inner_join(EventOrganizer)
            .filter(event_organizer::Column::EventId.eq(event_id))
            .order_by_asc(user::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Number of guests.
    pub async fn guest_count(&self, event_id: i32) -> AppResult<u64> {
        EventGuest::find()
            .filter(event_guest::Column::EventId.eq(event_id))
            .count(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Whether the user organizes the event.
    pub async fn is_organizer(&self, event_id: i32, user_id: i32) -> AppResult<bool> {
        EventOrganizer::find_by_id((event_id, user_id))
            .one(self.db.as_ref())
            .await
            .map(|row| row.is_some())
            .map_err(db_error)
    }

    /// List events matching a filter, ordered by start time.
    pub async fn list(
        &self,
        filter: &EventFilter,
        now: DateTimeWithTimeZone,
        pagination: Pagination,
    ) -> AppResult<Page<event::Model>> {
        let query = Self::filtered(filter, now);

        let count = query
            .clone()
            .count(self.db.as_ref())
            .await
            .map_err(db_error)?;

        let results = query
            .order_by_asc(event::Column::StartTime)
            .order_by_asc(event::Column::Id)
            .offset(pagination.offset())
            .limit(pagination.limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)?;

        Ok(Page { count, results })
    }

    fn filtered(filter: &EventFilter, now: DateTimeWithTimeZone) -> Select<Event> {
        let mut condition = Condition::all();

        if let Some(name) = &filter.name {
            condition = condition.add(event::Column::Name.contains(name));
        }
        if let Some(location) = &filter.location {
            condition = condition.add(event::Column::Location.contains(location));
        }
        if let Some(started) = filter.started {
            condition = condition.add(if started {
                event::Column::StartTime.lte(now)
            } else {
                event::Column::StartTime.gt(now)
            });
        }
        if let Some(ended) = filter.ended {
            condition = condition.add(if ended {
                event::Column::EndTime.lte(now)
            } else {
                event::Column::EndTime.gt(now)
            });
        }
        if !filter.show_full {
            condition = condition.add(
                Condition::any()
                    .add(event::Column::SpaceRemain.is_null())
                    .add(event::Column::SpaceRemain.gt(0)),
            );
        }
        if let Some(published) = filter.published {
            condition = condition.add(event::Column::Published.eq(published));
        }

        Event::find().filter(condition)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sea_orm::{DatabaseBackend, MockDatabase, QueryTrait, Value};

    fn create_test_event(id: i32, capacity: Option<i32>) -> event::Model {
        let now = Utc::now();
        event::Model {
            id,
            name: format!("Event {id}"),
            description: "Board games".to_string(),
            location: "BA 1160".to_string(),
            start_time: (now + Duration::days(1)).into(),
            end_time: (now + Duration::days(2)).into(),
            capacity,
            space_remain: capacity,
            points_remain: 500,
            points_awarded: 0,
            published: true,
            created_at: now.into(),
        }
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let event = create_test_event(4, Some(20));

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[event]])
                .into_connection(),
        );

        let repo = EventRepository::new(db);
        let found = repo.get_by_id(4).await.unwrap();

        assert_eq!(found.capacity, Some(20));
        assert_eq!(found.total_points(), 500);
    }

    #[tokio::test]
    async fn test_guest_count() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => Value::BigInt(Some(3)),
                }]])
                .into_connection(),
        );

        let repo = EventRepository::new(db);
        assert_eq!(repo.guest_count(1).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_is_organizer_false_when_missing() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<event_organizer::Model>::new()])
                .into_connection(),
        );

        let repo = EventRepository::new(db);
        assert!(!repo.is_organizer(1, 2).await.unwrap());
    }

    #[test]
    fn test_full_events_hidden_by_default() {
        let sql = EventRepository::filtered(&EventFilter::default(), Utc::now().into())
            .build(DatabaseBackend::Postgres)
            .to_string();

        assert!(sql.contains("\"space_remain\" IS NULL"));
        assert!(sql.contains("\"space_remain\" > 0"));
    }

    #[test]
    fn test_show_full_drops_space_condition() {
        let filter = EventFilter {
            show_full: true,
            ..Default::default()
        };
        let sql = EventRepository::filtered(&filter, Utc::now().into())
            .build(DatabaseBackend::Postgres)
            .to_string();

        assert!(!sql.contains("space_remain\" >"));
    }
}
