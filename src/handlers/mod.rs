pub mod auth;
pub mod payment;
pub mod registration;
