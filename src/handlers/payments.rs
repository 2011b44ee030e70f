use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use bytes::Bytes;
use uuid::Uuid;

use crate::{
    errors::ServiceError, services::payment_gateway::PaymentInitiation, ApiResponse, AppState,
};

/// POST /api/v1/orders/:id/payment
///
/// Registers the order with the payment gateway and returns where to send
/// the buyer. Safe to call again when a previous attempt left no handle.
pub async fn initiate_payment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentInitiation>>, ServiceError> {
    let initiation = state.services.payments.initiate(order_id).await?;
    Ok(Json(ApiResponse::success(initiation)))
}

/// POST /api/v1/payments/webhook
///
/// Always answers with the status chosen by the reconciler; the raw body is
/// read so malformed JSON becomes a 400 from the reconciler itself.
pub async fn payment_webhook(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let outcome = state.services.webhooks.handle_callback(&body).await;
    (outcome.status, Json(outcome.body))
}
