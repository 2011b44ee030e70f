mod common;

use axum::http::StatusCode;
use rust_decimal_macros::dec;
use serde_json::json;
use tienda_api::{
    entities::{OrderStatus, PaymentMethod},
    services::payment_gateway::callback_token,
};

use common::{response_json, test_config, TestApp, PRIVATE_KEY};

const WEBHOOK: &str = "/api/v1/payments/webhook";

fn callback(paid: bool, handle: &str, token: &str) -> String {
    json!({
        "respuesta": true,
        "resultado": [{
            "pagado": paid,
            "hash_pedido": handle,
            "token": token,
            "forma_pago": "Tarjetas de crédito",
        }]
    })
    .to_string()
}

fn signed(paid: bool, handle: &str) -> String {
    callback(paid, handle, &callback_token(PRIVATE_KEY, handle))
}

// ==================== Verification ====================

#[tokio::test]
async fn malformed_payload_is_a_bad_request() {
    let app = TestApp::new().await;

    for raw in ["not json", r#"{"respuesta":true}"#, r#"{"resultado":[]}"#] {
        let response = app.post_raw(WEBHOOK, raw).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{raw}");
        let body = response_json(response).await;
        assert_eq!(body["error"], "invalid payload");
    }
}

#[tokio::test]
async fn forged_token_is_rejected_without_mutation() {
    let app = TestApp::new().await;
    let product = app.seed_product("Canasta", dec!(100000), 5).await;
    let order = app.place_order(&product, 2, PaymentMethod::Gateway).await;
    app.attach_handle(&order, "hash-forged").await;

    let forged = callback(true, "hash-forged", &callback_token("other-key", "hash-forged"));
    let response = app.post_raw(WEBHOOK, &forged).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let stored = app.order(order.id).await;
    assert_eq!(stored.status, OrderStatus::PendienteDePago);
}

#[tokio::test]
async fn callbacks_are_acknowledged_unprocessed_without_private_key() {
    let mut cfg = test_config("http://127.0.0.1:9");
    cfg.gateway.private_key = None;
    let app = TestApp::with_config(cfg).await;
    let product = app.seed_product("Canasta", dec!(100000), 5).await;
    let order = app.place_order(&product, 1, PaymentMethod::Gateway).await;
    app.attach_handle(&order, "hash-nokey").await;

    let response = app.post_raw(WEBHOOK, &signed(true, "hash-nokey")).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(app.order(order.id).await.status, OrderStatus::PendienteDePago);
}

// ==================== Reconciliation ====================

#[tokio::test]
async fn paid_callback_marks_order_paid_and_echoes_result() {
    let app = TestApp::new().await;
    let product = app.seed_product("Canasta", dec!(100000), 5).await;
    let order = app.place_order(&product, 2, PaymentMethod::Gateway).await;
    app.attach_handle(&order, "hash-paid").await;

    let response = app.post_raw(WEBHOOK, &signed(true, "hash-paid")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert!(body.is_array());
    assert_eq!(body[0]["hash_pedido"], "hash-paid");

    let stored = app.order(order.id).await;
    assert_eq!(stored.status, OrderStatus::Pagado);
    assert_eq!(stored.transaction_handle.as_deref(), Some("hash-paid"));
}

#[tokio::test]
async fn replayed_callback_leaves_order_unchanged() {
    let app = TestApp::new().await;
    let product = app.seed_product("Canasta", dec!(100000), 5).await;
    let order = app.place_order(&product, 1, PaymentMethod::Gateway).await;
    app.attach_handle(&order, "hash-replay").await;

    let payload = signed(true, "hash-replay");
    let response = app.post_raw(WEBHOOK, &payload).await;
    assert_eq!(response.status(), StatusCode::OK);
    let after_first = app.order(order.id).await;

    let response = app.post_raw(WEBHOOK, &payload).await;
    assert_eq!(response.status(), StatusCode::OK);
    let after_second = app.order(order.id).await;

    assert_eq!(after_second.status, OrderStatus::Pagado);
    assert_eq!(after_second.version, after_first.version);
    assert_eq!(after_second.updated_at, after_first.updated_at);
}

#[tokio::test]
async fn unpaid_callback_moves_pending_order_to_processing() {
    let app = TestApp::new().await;
    let product = app.seed_product("Canasta", dec!(100000), 5).await;
    let order = app.place_order(&product, 1, PaymentMethod::Gateway).await;
    app.attach_handle(&order, "hash-unpaid").await;

    let response = app.post_raw(WEBHOOK, &signed(false, "hash-unpaid")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.order(order.id).await.status, OrderStatus::Procesando);
}

#[tokio::test]
async fn unpaid_callback_does_not_undo_a_payment() {
    let app = TestApp::new().await;
    let product = app.seed_product("Canasta", dec!(100000), 5).await;
    let order = app.place_order(&product, 1, PaymentMethod::Gateway).await;
    app.attach_handle(&order, "hash-late").await;

    app.post_raw(WEBHOOK, &signed(true, "hash-late")).await;
    let response = app.post_raw(WEBHOOK, &signed(false, "hash-late")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.order(order.id).await.status, OrderStatus::Pagado);
}

#[tokio::test]
async fn replayed_payment_does_not_pull_back_a_shipped_order() {
    let app = TestApp::new().await;
    let product = app.seed_product("Canasta", dec!(100000), 5).await;
    let order = app.place_order(&product, 1, PaymentMethod::Gateway).await;
    app.attach_handle(&order, "hash-shipped").await;

    let payload = signed(true, "hash-shipped");
    app.post_raw(WEBHOOK, &payload).await;
    app.state
        .services
        .order_status
        .set_status(order.id, "Enviado")
        .await
        .expect("ship order");
    let shipped = app.order(order.id).await;

    let response = app.post_raw(WEBHOOK, &payload).await;
    assert_eq!(response.status(), StatusCode::OK);

    let after = app.order(order.id).await;
    assert_eq!(after.status, OrderStatus::Enviado);
    assert_eq!(after.version, shipped.version);
}

#[tokio::test]
async fn unknown_handle_is_acknowledged_without_changes() {
    let app = TestApp::new().await;
    let product = app.seed_product("Canasta", dec!(100000), 5).await;
    let order = app.place_order(&product, 1, PaymentMethod::Gateway).await;
    app.attach_handle(&order, "hash-known").await;
    let before = app.order(order.id).await;

    let response = app.post_raw(WEBHOOK, &signed(true, "hash-unknown")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let after = app.order(order.id).await;
    assert_eq!(after.status, OrderStatus::PendienteDePago);
    assert_eq!(after.version, before.version);
}

#[tokio::test]
async fn closed_orders_ignore_callbacks() {
    let app = TestApp::new().await;
    let product = app.seed_product("Canasta", dec!(100000), 5).await;
    let order = app.place_order(&product, 1, PaymentMethod::Gateway).await;
    app.attach_handle(&order, "hash-closed").await;
    app.state
        .services
        .order_status
        .set_status(order.id, "Cancelado")
        .await
        .expect("cancel order");

    let response = app.post_raw(WEBHOOK, &signed(true, "hash-closed")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.order(order.id).await.status, OrderStatus::Cancelado);
}
