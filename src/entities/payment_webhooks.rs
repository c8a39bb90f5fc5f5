//! `SeaORM` Entity for payment_webhooks table
//!
//! Append-only: one row per inbound gateway notification, even when it
//! refers to an already-processed order.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_webhooks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: String,
    /// Status exactly as reported by the gateway, unparsed
    pub payment_status: String,
    pub reference: String,
    pub metadata: Option<String>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
