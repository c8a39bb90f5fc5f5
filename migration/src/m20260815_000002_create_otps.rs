use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Otps::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Otps::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Otps::UserId).uuid().not_null())
                    .col(ColumnDef::new(Otps::Code).string_len(6).not_null())
                    .col(ColumnDef::new(Otps::Purpose).string_len(50).not_null())
                    .col(
                        ColumnDef::new(Otps::IsUsed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Otps::ExpiresAt).timestamp().not_null())
                    .col(
                        ColumnDef::new(Otps::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_otps_user_id")
                            .from(Otps::Table, Otps::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Verification filters on (user_id, purpose, is_used)
        manager
            .create_index(
                Index::create()
                    .name("idx_otps_user_purpose")
                    .table(Otps::Table)
                    .col(Otps::UserId)
                    .col(Otps::Purpose)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Otps::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Otps {
    Table,
    Id,
    UserId,
    Code,
    Purpose,
    IsUsed,
    ExpiresAt,
    CreatedAt,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}
