use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Primary key of the single settings row.
pub const SINGLETON_ID: i32 = 1;

/// Bank-transfer and e-wallet details shown to customers at checkout.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[serde(skip)]
    pub id: i32,
    pub bank_name: Option<String>,
    pub account_holder: Option<String>,
    pub account_number: Option<String>,
    pub tax_id: Option<String>,
    pub ewallet_name: Option<String>,
    pub ewallet_number: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
