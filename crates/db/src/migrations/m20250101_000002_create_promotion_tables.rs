//! Create promotion and user_promotion tables migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Promotion::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Promotion::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Promotion::Name).string_len(256).not_null())
                    .col(ColumnDef::new(Promotion::Description).text().not_null())
                    .col(ColumnDef::new(Promotion::Kind).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Promotion::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Promotion::EndTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Promotion::MinSpending).double())
                    .col(ColumnDef::new(Promotion::Rate).double())
                    .col(ColumnDef::new(Promotion::Points).integer())
                    .col(
                        ColumnDef::new(Promotion::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: kind (automatic promotions are scanned on every purchase)
        manager
            .create_index(
                Index::create()
                    .name("idx_promotion_kind")
                    .table(Promotion::Table)
                    .col(Promotion::Kind)
                    .to_owned(),
            )
            .await?;

        // One row per (user, one-time promotion) consumption
        manager
            .create_table(
                Table::create()
                    .table(UserPromotion::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(UserPromotion::UserId).integer().not_null())
                    .col(ColumnDef::new(UserPromotion::PromotionId).integer().not_null())
                    .col(
                        ColumnDef::new(UserPromotion::UsedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(UserPromotion::UserId)
                            .col(UserPromotion::PromotionId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_promotion_user")
                            .from(UserPromotion::Table, UserPromotion::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_promotion_promotion")
                            .from(UserPromotion::Table, UserPromotion::PromotionId)
                            .to(Promotion::Table, Promotion::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: promotion_id (for "used by" lookups)
        manager
            .create_index(
                Index::create()
                    .name("idx_user_promotion_promotion_id")
                    .table(UserPromotion::Table)
                    .col(UserPromotion::PromotionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserPromotion::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Promotion::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Promotion {
    Table,
    Id,
    Name,
    Description,
    Kind,
    StartTime,
    EndTime,
    MinSpending,
    Rate,
    Points,
    CreatedAt,
}

#[derive(Iden)]
enum UserPromotion {
    Table,
    UserId,
    PromotionId,
    UsedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
