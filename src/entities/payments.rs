//! `SeaORM` Entity for payments table
//!
//! A payment row is created before the gateway is called and only ever
//! moves from PENDING to a terminal status. Rows are never deleted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

impl PaymentStatus {
    /// Terminal statuses permit no further transition (the webhook path
    /// is the documented last-write-wins exception).
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Parse a gateway-reported status string, case-insensitively.
    pub fn parse_gateway(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum PaymentChannel {
    #[sea_orm(string_value = "MPESA-TZ")]
    #[serde(rename = "MPESA-TZ")]
    MpesaTz,
    #[sea_orm(string_value = "TIGO-TZ")]
    #[serde(rename = "TIGO-TZ")]
    TigoTz,
    #[sea_orm(string_value = "AIRTEL-TZ")]
    #[serde(rename = "AIRTEL-TZ")]
    AirtelTz,
}

impl PaymentChannel {
    pub fn parse_gateway(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MPESA-TZ" => Some(Self::MpesaTz),
            "TIGO-TZ" => Some(Self::TigoTz),
            "AIRTEL-TZ" => Some(Self::AirtelTz),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Nullable: test payments may be anonymous
    pub user_id: Option<Uuid>,
    #[sea_orm(unique)]
    pub order_id: String,
    pub buyer_email: String,
    pub buyer_name: String,
    pub buyer_phone: String,
    /// Amount in TZS, no decimals
    pub amount: i64,
    pub payment_status: PaymentStatus,
    pub payment_channel: Option<PaymentChannel>,
    pub transaction_id: Option<String>,
    pub reference: Option<String>,
    pub msisdn: Option<String>,
    pub webhook_url: Option<String>,
    pub metadata: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
