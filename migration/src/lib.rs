pub use sea_orm_migration::prelude::*;

mod m20260815_000001_create_users;
mod m20260815_000002_create_otps;
mod m20260815_000003_create_customer_profiles;
mod m20260815_000004_create_documents;
mod m20260816_000001_create_payments;
mod m20260816_000002_create_payment_webhooks;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260815_000001_create_users::Migration),
            Box::new(m20260815_000002_create_otps::Migration),
            Box::new(m20260815_000003_create_customer_profiles::Migration),
            Box::new(m20260815_000004_create_documents::Migration),
            Box::new(m20260816_000001_create_payments::Migration),
            Box::new(m20260816_000002_create_payment_webhooks::Migration),
        ]
    }
}
