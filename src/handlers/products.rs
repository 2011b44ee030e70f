use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::ProductModel,
    errors::ServiceError,
    handlers::common::{created_json, Page, PaginatedResponse},
    services::catalog::{CreateProductInput, UpdateProductInput},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub category: Option<String>,
}

/// GET /api/v1/products
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<ProductModel>>>, ServiceError> {
    let page = Page::new(query.page, query.limit);
    let (products, total) = state
        .services
        .product_catalog
        .list_products(query.category.as_deref(), page.number, Some(page.size))
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        products, page, total,
    ))))
}

/// GET /api/v1/products/:id
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductModel>>, ServiceError> {
    let product = state.services.product_catalog.get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// POST /api/v1/admin/products
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state
        .services
        .product_catalog
        .create_product(payload)
        .await?;
    Ok(created_json(ApiResponse::success(product)))
}

/// PUT /api/v1/admin/products/:id
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductInput>,
) -> Result<Json<ApiResponse<ProductModel>>, ServiceError> {
    let product = state
        .services
        .product_catalog
        .update_product(id, payload)
        .await?;
    Ok(Json(ApiResponse::success(product)))
}
