//! `SeaORM` Entity for documents table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(50))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    #[sea_orm(string_value = "NATIONAL_ID")]
    NationalId,
    #[sea_orm(string_value = "DRIVERS_LICENSE")]
    DriversLicense,
    #[sea_orm(string_value = "VEHICLE_PAPERS")]
    VehiclePapers,
    #[sea_orm(string_value = "LOCAL_GOV_LETTER")]
    LocalGovLetter,
    #[sea_orm(string_value = "BUSINESS_LICENSE")]
    BusinessLicense,
    #[sea_orm(string_value = "BUSINESS_REGISTRATION")]
    BusinessRegistration,
}

impl FromStr for DocumentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "national_id" => Ok(Self::NationalId),
            "drivers_license" => Ok(Self::DriversLicense),
            "vehicle_papers" => Ok(Self::VehiclePapers),
            "local_gov_letter" => Ok(Self::LocalGovLetter),
            "business_license" => Ok(Self::BusinessLicense),
            "business_registration" => Ok(Self::BusinessRegistration),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "APPROVED")]
    Approved,
    #[sea_orm(string_value = "REJECTED")]
    Rejected,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_type: DocumentType,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i32,
    pub mime_type: String,
    pub verification_status: VerificationStatus,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
