use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::handlers::common::{created_json, no_content, ok_json, validated};
use crate::{
    entities::{DeliveryOption, OrderStatus, PaymentMethod, ProductSnapshot},
    errors::{ApiError, ServiceError},
    events::Event,
    services::cart::{Cart, CartChange, CartLine},
    services::checkout::CheckoutForm,
    AppState,
};

#[derive(Debug, Serialize)]
pub struct CartLineResponse {
    pub product: ProductSnapshot,
    pub quantity: i32,
    pub stock: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

impl From<&CartLine> for CartLineResponse {
    fn from(line: &CartLine) -> Self {
        Self {
            product: line.product.clone(),
            quantity: line.quantity,
            stock: line.stock,
            unit_price: line.unit_price(),
            subtotal: line.subtotal(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub id: Uuid,
    pub items: Vec<CartLineResponse>,
    pub item_count: i32,
    pub total: Decimal,
    /// Set when the last add was capped at available stock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl CartResponse {
    fn new(id: Uuid, cart: &Cart) -> Self {
        Self {
            id,
            items: cart.lines().iter().map(CartLineResponse::from).collect(),
            item_count: cart.item_count(),
            total: cart.total(),
            notice: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(flatten)]
    pub customer: CheckoutForm,
    pub delivery_option: DeliveryOption,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub total: Decimal,
}

fn cart_view(state: &AppState, cart_id: Uuid) -> Result<CartResponse, ApiError> {
    let cart = state
        .services
        .carts
        .get(cart_id)
        .ok_or_else(|| ApiError::NotFound(format!("Cart {} not found", cart_id)))?;
    Ok(CartResponse::new(cart_id, &cart))
}

/// Re-reads every product in the cart so prices and stock are current.
async fn refresh_cart(state: &AppState, cart_id: Uuid) -> Result<(), ServiceError> {
    let carts = &state.services.carts;
    let ids: Vec<Uuid> = carts
        .get(cart_id)
        .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?
        .lines()
        .iter()
        .map(|l| l.product.id)
        .collect();

    let mut products = Vec::with_capacity(ids.len());
    for id in ids {
        products.push(state.services.product_catalog.get_product(id).await?);
    }

    carts.with_cart(cart_id, |cart| {
        for product in &products {
            cart.sync_product(product);
        }
    })
}

/// POST /api/v1/carts
pub async fn create_cart(State(state): State<AppState>) -> impl IntoResponse {
    let id = state.services.carts.create();
    created_json(CartResponse::new(id, &Cart::new()))
}

/// GET /api/v1/carts/:id
pub async fn get_cart(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(ok_json(cart_view(&state, cart_id)?))
}

/// POST /api/v1/carts/:id/items
pub async fn add_item(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = validated(payload)?;

    let product = state
        .services
        .product_catalog
        .get_product(payload.product_id)
        .await?;

    let change = state
        .services
        .carts
        .with_cart(cart_id, |cart| cart.add(&product, payload.quantity))?;

    let mut view = cart_view(&state, cart_id)?;
    match change {
        CartChange::Added(_) => {}
        CartChange::Clamped(available) => {
            view.notice = Some(format!(
                "Only {} units of {} available",
                available, product.name
            ));
        }
        CartChange::Rejected => {
            return Err(ServiceError::InvalidOperation(format!(
                "{} is out of stock",
                product.name
            ))
            .into());
        }
    }

    Ok(ok_json(view))
}

/// PUT /api/v1/carts/:id/items/:product_id
pub async fn set_item_quantity(
    State(state): State<AppState>,
    Path((cart_id, product_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SetQuantityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    refresh_cart(&state, cart_id).await?;

    state
        .services
        .carts
        .with_cart(cart_id, |cart| cart.set_quantity(product_id, payload.quantity))??;

    Ok(ok_json(cart_view(&state, cart_id)?))
}

/// DELETE /api/v1/carts/:id/items/:product_id
pub async fn remove_item(
    State(state): State<AppState>,
    Path((cart_id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .services
        .carts
        .with_cart(cart_id, |cart| cart.remove(product_id))?;

    if !removed {
        return Err(ApiError::NotFound(format!(
            "Product {} is not in the cart",
            product_id
        )));
    }

    Ok(ok_json(cart_view(&state, cart_id)?))
}

/// DELETE /api/v1/carts/:id
pub async fn clear_cart(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .carts
        .remove(cart_id)
        .ok_or_else(|| ApiError::NotFound(format!("Cart {} not found", cart_id)))?;

    state
        .event_sender
        .send_or_log(Event::CartCleared(cart_id))
        .await;

    Ok(no_content())
}

/// POST /api/v1/carts/:id/checkout
pub async fn checkout(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    refresh_cart(&state, cart_id).await?;

    let order_id = state
        .services
        .checkout
        .submit_session(
            cart_id,
            payload.customer,
            payload.delivery_option,
            payload.payment_method,
        )
        .await?;

    let order = state
        .services
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", order_id)))?;

    Ok(created_json(CheckoutResponse {
        order_id,
        status: order.status,
        total: order.total,
    }))
}
