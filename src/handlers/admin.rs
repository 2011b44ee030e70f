use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    entities::{OrderModel, OrderStatus},
    errors::ServiceError,
    handlers::common::{created_json, Page, PaginatedResponse},
    repositories::OrderFilter,
    services::checkout::{CheckoutForm, SaleLine},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
pub struct AdminOrderQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordSaleRequest {
    #[serde(flatten)]
    pub customer: CheckoutForm,
    pub items: Vec<SaleLine>,
}

#[derive(Debug, Serialize)]
pub struct SaleResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

/// GET /api/v1/admin/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<AdminOrderQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderModel>>>, ServiceError> {
    let page = Page::new(query.page, query.per_page);
    let orders = &state.services.orders;

    let (data, total) = match query.status.as_deref().map(str::trim) {
        Some(label) if !label.is_empty() => {
            let status = OrderStatus::from_str(label).map_err(|_| {
                ServiceError::InvalidStatus(format!("Unknown order status: {label}"))
            })?;
            let matching = orders.query(OrderFilter::Status(status)).await?;
            let total = matching.len() as u64;
            (page.slice(matching), total)
        }
        _ => orders.list(page.number, page.size).await?,
    };

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        data, page, total,
    ))))
}

/// PUT /api/v1/admin/orders/:id/status
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<OrderModel>>, ServiceError> {
    let order = state
        .services
        .order_status
        .set_status(id, &payload.status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/v1/admin/sales
pub async fn record_sale(
    State(state): State<AppState>,
    Json(payload): Json<RecordSaleRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    if payload.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "A sale needs at least one item".to_string(),
        ));
    }

    let order_id = state
        .services
        .checkout
        .record_sale(payload.items, payload.customer)
        .await?;

    let order = state
        .services
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    Ok(created_json(ApiResponse::success(SaleResponse {
        order_id,
        status: order.status,
    })))
}
