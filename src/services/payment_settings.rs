use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    entities::payment_settings::{ActiveModel, Entity as PaymentSettings, Model, SINGLETON_ID},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::order_store::map_db_err,
};

/// Replacement values for the settings record. Blank strings clear a field.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PaymentSettingsInput {
    #[validate(length(max = 120))]
    pub bank_name: Option<String>,
    #[validate(length(max = 120))]
    pub account_holder: Option<String>,
    #[validate(length(max = 64))]
    pub account_number: Option<String>,
    #[validate(length(max = 32))]
    pub tax_id: Option<String>,
    #[validate(length(max = 120))]
    pub ewallet_name: Option<String>,
    #[validate(length(max = 64))]
    pub ewallet_number: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Bank-transfer and e-wallet details shown at checkout.
#[derive(Clone)]
pub struct PaymentSettingsService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl PaymentSettingsService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Current settings; all fields empty until an admin saves them.
    pub async fn get(&self) -> Result<Model, ServiceError> {
        let stored = PaymentSettings::find_by_id(SINGLETON_ID)
            .one(&*self.db)
            .await
            .map_err(map_db_err)?;

        Ok(stored.unwrap_or_else(|| Model {
            id: SINGLETON_ID,
            bank_name: None,
            account_holder: None,
            account_number: None,
            tax_id: None,
            ewallet_name: None,
            ewallet_number: None,
            updated_at: Utc::now(),
        }))
    }

    #[instrument(skip(self, input))]
    pub async fn save(&self, input: PaymentSettingsInput) -> Result<Model, ServiceError> {
        input.validate()?;

        let exists = PaymentSettings::find_by_id(SINGLETON_ID)
            .one(&*self.db)
            .await
            .map_err(map_db_err)?
            .is_some();

        let active = ActiveModel {
            id: Set(SINGLETON_ID),
            bank_name: Set(clean(input.bank_name)),
            account_holder: Set(clean(input.account_holder)),
            account_number: Set(clean(input.account_number)),
            tax_id: Set(clean(input.tax_id)),
            ewallet_name: Set(clean(input.ewallet_name)),
            ewallet_number: Set(clean(input.ewallet_number)),
            updated_at: Set(Utc::now()),
        };

        let saved = if exists {
            active.update(&*self.db).await
        } else {
            active.insert(&*self.db).await
        }
        .map_err(map_db_err)?;

        info!("Payment settings updated");
        self.event_sender
            .send_or_log(Event::PaymentSettingsUpdated)
            .await;

        Ok(saved)
    }
}
