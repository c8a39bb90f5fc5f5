use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Documents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Documents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Documents::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(Documents::DocumentType)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Documents::FileUrl).string_len(500).not_null())
                    .col(
                        ColumnDef::new(Documents::FileName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Documents::FileSize).integer().not_null())
                    .col(
                        ColumnDef::new(Documents::MimeType)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Documents::VerificationStatus)
                            .string_len(20)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(ColumnDef::new(Documents::VerifiedBy).uuid().null())
                    .col(ColumnDef::new(Documents::VerifiedAt).timestamp().null())
                    .col(ColumnDef::new(Documents::RejectionReason).text().null())
                    .col(
                        ColumnDef::new(Documents::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Documents::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_documents_user_id")
                            .from(Documents::Table, Documents::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_documents_verified_by")
                            .from(Documents::Table, Documents::VerifiedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_documents_user_id")
                    .table(Documents::Table)
                    .col(Documents::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Documents::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Documents {
    Table,
    Id,
    UserId,
    DocumentType,
    FileUrl,
    FileName,
    FileSize,
    MimeType,
    VerificationStatus,
    VerifiedBy,
    VerifiedAt,
    RejectionReason,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}
