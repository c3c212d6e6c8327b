//! Create event, event_guest and event_organizer tables migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Event::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Event::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Event::Name).string_len(256).not_null())
                    .col(ColumnDef::new(Event::Description).text().not_null())
                    .col(ColumnDef::new(Event::Location).string_len(256).not_null())
                    .col(
                        ColumnDef::new(Event::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Event::EndTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Event::Capacity).integer())
                    .col(ColumnDef::new(Event::SpaceRemain).integer())
                    .col(ColumnDef::new(Event::PointsRemain).integer().not_null())
                    .col(
                        ColumnDef::new(Event::PointsAwarded)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Event::Published)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Event::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: start_time (listing order and started/ended filters)
        manager
            .create_index(
                Index::create()
                    .name("idx_event_start_time")
                    .table(Event::Table)
                    .col(Event::StartTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EventGuest::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EventGuest::EventId).integer().not_null())
                    .col(ColumnDef::new(EventGuest::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(EventGuest::AddedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(EventGuest::EventId)
                            .col(EventGuest::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_guest_event")
                            .from(EventGuest::Table, EventGuest::EventId)
                            .to(Event::Table, Event::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_guest_user")
                            .from(EventGuest::Table, EventGuest::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: user_id (events a user attends)
        manager
            .create_index(
                Index::create()
                    .name("idx_event_guest_user_id")
                    .table(EventGuest::Table)
                    .col(EventGuest::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EventOrganizer::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EventOrganizer::EventId).integer().not_null())
                    .col(ColumnDef::new(EventOrganizer::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(EventOrganizer::AddedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(EventOrganizer::EventId)
                            .col(EventOrganizer::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_organizer_event")
                            .from(EventOrganizer::Table, EventOrganizer::EventId)
                            .to(Event::Table, Event::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_organizer_user")
                            .from(EventOrganizer::Table, EventOrganizer::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: user_id (events a user organizes)
        manager
            .create_index(
                Index::create()
                    .name("idx_event_organizer_user_id")
                    .table(EventOrganizer::Table)
                    .col(EventOrganizer::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EventOrganizer::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EventGuest::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Event::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Event {
    Table,
    Id,
    Name,
    Description,
    Location,
    StartTime,
    EndTime,
    Capacity,
    SpaceRemain,
    PointsRemain,
    PointsAwarded,
    Published,
    CreatedAt,
}

#[derive(Iden)]
enum EventGuest {
    Table,
    EventId,
    UserId,
    AddedAt,
}

#[derive(Iden)]
enum EventOrganizer {
    Table,
    EventId,
    UserId,
    AddedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
