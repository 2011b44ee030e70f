//! Tienda API Library
//!
//! Storefront and back-office service for a small online shop: catalog,
//! session carts, checkout, online payment through an external gateway with
//! webhook reconciliation, and manual order status management.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{AdminKey, AuthRouterExt};
use crate::repositories::{OrderStore, SqlOrderStore};
use crate::services::payment_gateway::PaymentGateway;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
}

impl AppState {
    /// State backed by the SQL order store on `db`.
    pub fn new(
        db: DatabaseConnection,
        config: config::AppConfig,
        event_sender: events::EventSender,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let db = Arc::new(db);
        let orders: Arc<dyn OrderStore> = Arc::new(SqlOrderStore::new(db.clone()));
        Self::with_order_store(db, config, event_sender, orders, gateway)
    }

    pub fn with_order_store(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let event_sender = Arc::new(event_sender);
        let services = handlers::AppServices::new(
            db.clone(),
            &config,
            event_sender.clone(),
            orders,
            gateway,
        );

        Self {
            db,
            config: Arc::new(config),
            event_sender,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Routes mounted under `/api/v1`.
pub fn api_v1_routes(admin_key: AdminKey) -> Router<AppState> {
    let storefront = Router::new()
        .route("/health", get(health_check))
        .route("/products", get(handlers::products::list_products))
        .route("/products/:id", get(handlers::products::get_product))
        .route("/carts", post(handlers::carts::create_cart))
        .route(
            "/carts/:id",
            get(handlers::carts::get_cart).delete(handlers::carts::clear_cart),
        )
        .route("/carts/:id/items", post(handlers::carts::add_item))
        .route(
            "/carts/:id/items/:product_id",
            put(handlers::carts::set_item_quantity).delete(handlers::carts::remove_item),
        )
        .route("/carts/:id/checkout", post(handlers::carts::checkout))
        .route("/orders", get(handlers::orders::list_customer_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/payment",
            post(handlers::payments::initiate_payment),
        )
        .route(
            "/payments/webhook",
            post(handlers::payments::payment_webhook),
        )
        .route(
            "/payment-settings",
            get(handlers::payment_settings::get_payment_settings),
        );

    let admin = Router::new()
        .route("/admin/orders", get(handlers::admin::list_orders))
        .route(
            "/admin/orders/:id/status",
            put(handlers::admin::update_order_status),
        )
        .route("/admin/sales", post(handlers::admin::record_sale))
        .route("/admin/products", post(handlers::products::create_product))
        .route(
            "/admin/products/:id",
            put(handlers::products::update_product),
        )
        .route(
            "/admin/payment-settings",
            put(handlers::payment_settings::update_payment_settings),
        )
        .with_admin_key(admin_key);

    storefront.merge(admin)
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        if !cfg.is_development() {
            ::tracing::warn!("No CORS origins configured; allowing any origin");
        }
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Full application router with the HTTP middleware stack applied.
pub fn app_router(state: AppState) -> Router {
    let admin_key = AdminKey::new(state.config.admin_api_key.as_deref());
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(|| async { "tienda-api up" }))
        .nest("/api/v1", api_v1_routes(admin_key))
        .layer(axum::middleware::from_fn(crate::tracing::request_id_scope))
        .layer(TraceLayer::new_for_http().make_span_with(crate::tracing::RequestSpanMaker))
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Liveness plus a database round-trip.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "database": "up",
                "timestamp": Utc::now().to_rfc3339(),
            })),
        ),
        Err(e) => {
            ::tracing::error!(error = %e, "Health check database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "database": "down",
                    "timestamp": Utc::now().to_rfc3339(),
                })),
            )
        }
    }
}
