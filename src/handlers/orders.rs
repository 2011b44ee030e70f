use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::OrderModel, errors::ServiceError, repositories::OrderFilter, ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
pub struct OrderLookupQuery {
    pub email: Option<String>,
}

/// GET /api/v1/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderModel>>, ServiceError> {
    match state.services.orders.get(id).await? {
        Some(order) => Ok(Json(ApiResponse::success(order))),
        None => Err(ServiceError::NotFound(format!(
            "Order with ID {} not found",
            id
        ))),
    }
}

/// GET /api/v1/orders?email=
pub async fn list_customer_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderLookupQuery>,
) -> Result<Json<ApiResponse<Vec<OrderModel>>>, ServiceError> {
    let email = query
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("email query parameter is required".to_string()))?;

    let orders = state
        .services
        .orders
        .query(OrderFilter::CustomerEmail(email))
        .await?;

    Ok(Json(ApiResponse::success(orders)))
}
