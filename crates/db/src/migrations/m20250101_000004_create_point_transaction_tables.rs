//! Create point_transaction and transaction_promotion tables migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PointTransaction::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PointTransaction::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PointTransaction::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(PointTransaction::Utorid).string_len(8).not_null())
                    .col(ColumnDef::new(PointTransaction::Points).integer().not_null())
                    .col(ColumnDef::new(PointTransaction::Spent).double())
                    .col(ColumnDef::new(PointTransaction::RelatedId).integer())
                    .col(ColumnDef::new(PointTransaction::Remark).text())
                    .col(
                        ColumnDef::new(PointTransaction::CreatedBy)
                            .string_len(8)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PointTransaction::Suspicious)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PointTransaction::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_point_transaction_user")
                            .from(PointTransaction::Table, PointTransaction::Utorid)
                            .to(User::Table, User::Utorid)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: utorid (a user's history)
        manager
            .create_index(
                Index::create()
                    .name("idx_point_transaction_utorid")
                    .table(PointTransaction::Table)
                    .col(PointTransaction::Utorid)
                    .to_owned(),
            )
            .await?;

        // Index: kind + related_id (redemption queue, adjustments of a transaction)
        manager
            .create_index(
                Index::create()
                    .name("idx_point_transaction_kind_related_id")
                    .table(PointTransaction::Table)
                    .col(PointTransaction::Kind)
                    .col(PointTransaction::RelatedId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TransactionPromotion::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransactionPromotion::TransactionId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionPromotion::PromotionId)
                            .integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(TransactionPromotion::TransactionId)
                            .col(TransactionPromotion::PromotionId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transaction_promotion_transaction")
                            .from(TransactionPromotion::Table, TransactionPromotion::TransactionId)
                            .to(PointTransaction::Table, PointTransaction::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transaction_promotion_promotion")
                            .from(TransactionPromotion::Table, TransactionPromotion::PromotionId)
                            .to(Promotion::Table, Promotion::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TransactionPromotion::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PointTransaction::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PointTransaction {
    Table,
    Id,
    Kind,
    Utorid,
    Points,
    Spent,
    RelatedId,
    Remark,
    CreatedBy,
    Suspicious,
    CreatedAt,
}

#[derive(Iden)]
enum TransactionPromotion {
    Table,
    TransactionId,
    PromotionId,
}

#[derive(Iden)]
enum User {
    Table,
    Utorid,
}

#[derive(Iden)]
enum Promotion {
    Table,
    Id,
}
