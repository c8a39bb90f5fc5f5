use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only audit log of inbound gateway notifications
        manager
            .create_table(
                Table::create()
                    .table(PaymentWebhooks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PaymentWebhooks::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PaymentWebhooks::OrderId)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentWebhooks::PaymentStatus)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PaymentWebhooks::Reference)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PaymentWebhooks::Metadata).text().null())
                    .col(
                        ColumnDef::new(PaymentWebhooks::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_payment_webhooks_order_id")
                    .table(PaymentWebhooks::Table)
                    .col(PaymentWebhooks::OrderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PaymentWebhooks::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PaymentWebhooks {
    Table,
    Id,
    OrderId,
    PaymentStatus,
    Reference,
    Metadata,
    CreatedAt,
}
