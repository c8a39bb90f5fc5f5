use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CustomerProfiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CustomerProfiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CustomerProfiles::UserId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(CustomerProfiles::BusinessName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomerProfiles::BusinessRegistrationNumber)
                            .string_len(100)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(CustomerProfiles::Country)
                            .string_len(100)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CustomerProfiles::Region)
                            .string_len(100)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CustomerProfiles::District)
                            .string_len(100)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CustomerProfiles::Street)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CustomerProfiles::HouseNumber)
                            .string_len(50)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CustomerProfiles::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CustomerProfiles::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_customer_profiles_user_id")
                            .from(CustomerProfiles::Table, CustomerProfiles::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CustomerProfiles::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum CustomerProfiles {
    Table,
    Id,
    UserId,
    BusinessName,
    BusinessRegistrationNumber,
    Country,
    Region,
    District,
    Street,
    HouseNumber,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}
