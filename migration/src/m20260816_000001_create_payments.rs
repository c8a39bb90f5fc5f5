use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Payments::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Payments::UserId).uuid().null())
                    .col(
                        ColumnDef::new(Payments::OrderId)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Payments::BuyerEmail)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payments::BuyerName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payments::BuyerPhone)
                            .string_len(20)
                            .not_null(),
                    )
                    // Amount in TZS, no decimals
                    .col(ColumnDef::new(Payments::Amount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Payments::PaymentStatus)
                            .string_len(20)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(Payments::PaymentChannel)
                            .string_len(20)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Payments::TransactionId)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(Payments::Reference).string_len(255).null())
                    .col(ColumnDef::new(Payments::Msisdn).string_len(20).null())
                    .col(ColumnDef::new(Payments::WebhookUrl).text().null())
                    .col(ColumnDef::new(Payments::Metadata).text().null())
                    .col(
                        ColumnDef::new(Payments::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Payments::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payments_user_id")
                            .from(Payments::Table, Payments::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // The reconciliation sweep scans by status
        manager
            .create_index(
                Index::create()
                    .name("idx_payments_status")
                    .table(Payments::Table)
                    .col(Payments::PaymentStatus)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Payments {
    Table,
    Id,
    UserId,
    OrderId,
    BuyerEmail,
    BuyerName,
    BuyerPhone,
    Amount,
    PaymentStatus,
    PaymentChannel,
    TransactionId,
    Reference,
    Msisdn,
    WebhookUrl,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}
