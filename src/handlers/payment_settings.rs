use axum::{extract::State, response::Json};

use crate::{
    entities::PaymentSettingsModel, errors::ServiceError,
    services::payment_settings::PaymentSettingsInput, ApiResponse, AppState,
};

/// GET /api/v1/payment-settings
pub async fn get_payment_settings(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<PaymentSettingsModel>>, ServiceError> {
    let settings = state.services.payment_settings.get().await?;
    Ok(Json(ApiResponse::success(settings)))
}

/// PUT /api/v1/admin/payment-settings
pub async fn update_payment_settings(
    State(state): State<AppState>,
    Json(payload): Json<PaymentSettingsInput>,
) -> Result<Json<ApiResponse<PaymentSettingsModel>>, ServiceError> {
    let settings = state.services.payment_settings.save(payload).await?;
    Ok(Json(ApiResponse::success(settings)))
}
