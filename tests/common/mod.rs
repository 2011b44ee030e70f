#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tienda_api::{
    app_router,
    config::AppConfig,
    db,
    entities::{DeliveryOption, OrderModel, PaymentMethod, ProductModel},
    events::{self, EventSender},
    repositories::{OrderPatch, OrderStore},
    services::{
        cart::Cart,
        catalog::CreateProductInput,
        checkout::CheckoutForm,
        payment_gateway::{PagoparGateway, PaymentGateway},
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_KEY: &str = "test-admin-key";
pub const PUBLIC_KEY: &str = "test-public-key";
pub const PRIVATE_KEY: &str = "test-private-key";
pub const CHECKOUT_URL: &str = "https://pagos.test/pagos";
pub const RETURN_BASE_URL: &str = "https://tienda.test";

/// Configuration used by every test app; the gateway points at `gateway_url`.
pub fn test_config(gateway_url: &str) -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    cfg.db_max_connections = 1;
    cfg.admin_api_key = Some(ADMIN_KEY.to_string());
    cfg.gateway.public_key = Some(PUBLIC_KEY.to_string());
    cfg.gateway.private_key = Some(PRIVATE_KEY.to_string());
    cfg.gateway.api_url = format!("{}/iniciar-transaccion", gateway_url);
    cfg.gateway.checkout_url = CHECKOUT_URL.to_string();
    cfg.gateway.return_base_url = Some(RETURN_BASE_URL.to_string());
    cfg.gateway.timeout_secs = 5;
    cfg
}

/// Helper harness for spinning up the application against an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Application whose gateway is never expected to be reached.
    pub async fn new() -> Self {
        Self::with_config(test_config("http://127.0.0.1:9")).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::create_schema(&pool)
            .await
            .expect("failed to create schema");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway: Arc<dyn PaymentGateway> =
            Arc::new(PagoparGateway::new(cfg.gateway.clone()).expect("gateway client"));
        let state = AppState::new(pool, cfg, EventSender::new(event_tx), gateway);
        let router = app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Send a request against the router with optional JSON body and extra headers.
    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request_with_headers(method, uri, body, &[]).await
    }

    /// Request carrying the configured admin key.
    pub async fn admin_request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request_with_headers(method, uri, body, &[("x-admin-key", ADMIN_KEY)])
            .await
    }

    /// POST raw bytes, as the payment gateway does for callbacks.
    pub async fn post_raw(&self, uri: &str, raw: &str) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(raw.to_string()))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> ProductModel {
        self.state
            .services
            .product_catalog
            .create_product(CreateProductInput {
                name: name.to_string(),
                description: format!("{} seeded for integration tests", name),
                category: Some("Pruebas".to_string()),
                price,
                sale_price: None,
                on_sale: false,
                stock,
                image_url: None,
            })
            .await
            .expect("seed product for tests")
    }

    /// Places a pickup order for `quantity` units of `product` without going through HTTP.
    pub async fn place_order(
        &self,
        product: &ProductModel,
        quantity: i32,
        payment: PaymentMethod,
    ) -> OrderModel {
        let mut cart = Cart::new();
        cart.add(product, quantity);
        let order_id = self
            .state
            .services
            .checkout
            .submit(
                &mut cart,
                CheckoutForm {
                    name: "Ana Benítez".into(),
                    email: "ana@example.com".into(),
                    phone: "0981 123 456".into(),
                    address: None,
                    city: None,
                },
                DeliveryOption::Pickup,
                payment,
            )
            .await
            .expect("place order");
        self.order(order_id).await
    }

    pub async fn order(&self, id: Uuid) -> OrderModel {
        self.state
            .services
            .orders
            .get(id)
            .await
            .expect("order lookup")
            .expect("order exists")
    }

    /// Stores a gateway handle on `order` as a successful payment initiation would.
    pub async fn attach_handle(&self, order: &OrderModel, handle: &str) {
        self.state
            .services
            .orders
            .update(order.id, OrderPatch::transaction_handle(handle))
            .await
            .expect("attach transaction handle");
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
