use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    repositories::{OrderStore, ProductRepository},
    services::{
        cart::CartSessions, catalog::ProductCatalogService, checkout::CheckoutService,
        order_status::OrderStatusService, payment_gateway::PaymentGateway,
        payment_settings::PaymentSettingsService, payment_webhook::WebhookReconciler,
        payments::PaymentService,
    },
};

pub mod admin;
pub mod carts;
pub mod common;
pub mod orders;
pub mod payment_settings;
pub mod payments;
pub mod products;

/// Services shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<dyn OrderStore>,
    pub carts: Arc<CartSessions>,
    pub product_catalog: Arc<ProductCatalogService>,
    pub checkout: Arc<CheckoutService>,
    pub payments: Arc<PaymentService>,
    pub webhooks: Arc<WebhookReconciler>,
    pub order_status: Arc<OrderStatusService>,
    pub payment_settings: Arc<PaymentSettingsService>,
}

impl AppServices {
    /// Wires every service against one order store and one gateway.
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        event_sender: Arc<EventSender>,
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let products = Arc::new(ProductRepository::new(db_pool.clone()));
        let carts = Arc::new(CartSessions::new());

        let product_catalog = Arc::new(ProductCatalogService::new(
            products.clone(),
            event_sender.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            orders.clone(),
            products,
            carts.clone(),
            event_sender.clone(),
            config.store_city.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            orders.clone(),
            gateway,
            event_sender.clone(),
            config.gateway.return_base_url.clone(),
        ));
        let webhooks = Arc::new(WebhookReconciler::new(
            orders.clone(),
            event_sender.clone(),
            config.gateway.private_key().map(str::to_string),
        ));
        let order_status = Arc::new(OrderStatusService::new(
            orders.clone(),
            event_sender.clone(),
        ));
        let payment_settings = Arc::new(PaymentSettingsService::new(db_pool, event_sender));

        Self {
            orders,
            carts,
            product_catalog,
            checkout,
            payments,
            webhooks,
            order_status,
            payment_settings,
        }
    }
}
