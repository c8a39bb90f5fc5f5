pub use super::customer_profiles::Entity as CustomerProfiles;
pub use super::documents::Entity as Documents;
pub use super::otps::Entity as Otps;
pub use super::payment_webhooks::Entity as PaymentWebhooks;
pub use super::payments::Entity as Payments;
pub use super::users::Entity as Users;
