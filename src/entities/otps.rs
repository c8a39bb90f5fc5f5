//! `SeaORM` Entity for otps table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(50))")]
#[serde(rename_all = "kebab-case")]
pub enum OtpPurpose {
    #[sea_orm(string_value = "registration")]
    Registration,
    #[sea_orm(string_value = "password-reset")]
    PasswordReset,
    #[sea_orm(string_value = "login")]
    Login,
}

/// Rows are never deleted: used codes stay behind as an audit trail.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "otps")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub purpose: OtpPurpose,
    pub is_used: bool,
    pub expires_at: DateTime,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
