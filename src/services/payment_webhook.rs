use axum::http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    entities::{OrderModel, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{OrderFilter, OrderPatch, OrderStore},
    services::payment_gateway::{callback_token, constant_time_eq},
};

/// HTTP status and JSON body to answer the gateway with.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookOutcome {
    pub status: StatusCode,
    pub body: Value,
}

impl WebhookOutcome {
    fn ack(resultado: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: resultado,
        }
    }

    fn reject(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }
}

/// The part of a callback the reconciler acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Callback {
    paid: bool,
    hash_pedido: String,
    token: String,
}

/// Extracts the first `resultado` entry and its echo, or `None` when the
/// payload does not have the expected shape.
fn parse_callback(body: &[u8]) -> Option<(Callback, Value)> {
    let payload: Value = serde_json::from_slice(body).ok()?;
    let resultado = payload.get("resultado")?.clone();
    let first = resultado.as_array()?.first()?;

    let paid = match first.get("pagado")? {
        Value::Bool(flag) => *flag,
        Value::String(flag) => flag == "true",
        _ => return None,
    };
    let hash_pedido = first.get("hash_pedido")?.as_str()?.to_string();
    let token = first.get("token")?.as_str()?.to_string();

    Some((
        Callback {
            paid,
            hash_pedido,
            token,
        },
        resultado,
    ))
}

/// Status a callback moves `order` to, or `None` when nothing should change.
///
/// Callbacks only ever move an order forward: a payment is applied to orders
/// still waiting for it, and orders already paid or shipped are left alone.
fn target_status(order: &OrderModel, paid: bool) -> Option<OrderStatus> {
    match (order.status, paid) {
        (OrderStatus::PendienteDePago | OrderStatus::Procesando, true) => {
            Some(OrderStatus::Pagado)
        }
        (OrderStatus::PendienteDePago, false) => Some(OrderStatus::Procesando),
        _ => None,
    }
}

/// Verifies payment callbacks and applies them to the matching order.
///
/// Every path resolves to a [`WebhookOutcome`]; nothing is returned as an
/// error. Replaying a callback leaves the order as the first delivery did.
#[derive(Clone)]
pub struct WebhookReconciler {
    orders: Arc<dyn OrderStore>,
    event_sender: Arc<EventSender>,
    private_key: Option<String>,
}

impl WebhookReconciler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        event_sender: Arc<EventSender>,
        private_key: Option<String>,
    ) -> Self {
        Self {
            orders,
            event_sender,
            private_key: private_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
        }
    }

    #[instrument(skip(self, body), fields(body_len = body.len()))]
    pub async fn handle_callback(&self, body: &[u8]) -> WebhookOutcome {
        let Some((callback, resultado)) = parse_callback(body) else {
            warn!("Malformed payment callback");
            return WebhookOutcome::reject(StatusCode::BAD_REQUEST, "invalid payload");
        };

        let Some(private_key) = self.private_key.as_deref() else {
            warn!(
                hash_pedido = %callback.hash_pedido,
                "Gateway private key not configured; acknowledging callback without processing"
            );
            return WebhookOutcome::ack(resultado);
        };

        let expected = callback_token(private_key, &callback.hash_pedido);
        if !constant_time_eq(expected.as_bytes(), callback.token.as_bytes()) {
            warn!(hash_pedido = %callback.hash_pedido, "Payment callback token mismatch");
            self.event_sender
                .send_or_log(Event::WebhookRejected {
                    reason: format!("token mismatch for {}", callback.hash_pedido),
                })
                .await;
            return WebhookOutcome::reject(StatusCode::FORBIDDEN, "invalid token");
        }

        match self.apply(&callback).await {
            Ok(()) => WebhookOutcome::ack(resultado),
            Err(e) => {
                error!(
                    hash_pedido = %callback.hash_pedido,
                    error = %e,
                    "Failed to apply payment callback"
                );
                if e.is_permission_denied() {
                    self.event_sender
                        .send_or_log(Event::PermissionDenied {
                            operation: "payment callback".to_string(),
                            detail: e.to_string(),
                        })
                        .await;
                }
                WebhookOutcome::reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }

    async fn apply(&self, callback: &Callback) -> Result<(), ServiceError> {
        let order = self
            .orders
            .query(OrderFilter::TransactionHandle(callback.hash_pedido.clone()))
            .await?
            .into_iter()
            .next();

        let Some(order) = order else {
            error!(
                hash_pedido = %callback.hash_pedido,
                "No order carries this transaction handle; callback acknowledged but not applied"
            );
            return Ok(());
        };

        if order.status.is_terminal() {
            error!(
                order_id = %order.id,
                status = %order.status,
                paid = callback.paid,
                "Payment callback for closed order ignored"
            );
            return Ok(());
        }

        let Some(target) = target_status(&order, callback.paid) else {
            info!(order_id = %order.id, status = %order.status, "Payment callback already applied");
            return Ok(());
        };

        self.orders
            .update(order.id, OrderPatch::status(target))
            .await?;

        info!(
            order_id = %order.id,
            old_status = %order.status,
            new_status = %target,
            "Order reconciled from payment callback"
        );

        if target == OrderStatus::Pagado {
            self.event_sender
                .send_or_log(Event::PaymentConfirmed {
                    order_id: order.id,
                    transaction_handle: callback.hash_pedido.clone(),
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id: order.id,
                old_status: order.status,
                new_status: target,
            })
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{DeliveryOption, OrderLines, PaymentMethod};
    use crate::repositories::{InMemoryOrderStore, NewOrder};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use rstest::rstest;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    const KEY: &str = "unit-private-key";

    /// Store whose writes are refused, as on a read-only database.
    struct ReadOnlyStore(Arc<InMemoryOrderStore>);

    #[async_trait]
    impl OrderStore for ReadOnlyStore {
        async fn create(&self, order: NewOrder) -> Result<Uuid, ServiceError> {
            self.0.create(order).await
        }
        async fn get(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
            self.0.get(id).await
        }
        async fn query(&self, filter: OrderFilter) -> Result<Vec<OrderModel>, ServiceError> {
            self.0.query(filter).await
        }
        async fn update(&self, _id: Uuid, _patch: OrderPatch) -> Result<OrderModel, ServiceError> {
            Err(ServiceError::PermissionDenied("orders update".into()))
        }
        async fn list(&self, p: u64, n: u64) -> Result<(Vec<OrderModel>, u64), ServiceError> {
            self.0.list(p, n).await
        }
    }

    fn new_order(status: OrderStatus) -> NewOrder {
        NewOrder {
            customer_name: "Ana".into(),
            customer_email: "ana@example.com".into(),
            customer_phone: "0981".into(),
            shipping_address: "Retiro en tienda".into(),
            shipping_city: "Asunción".into(),
            delivery_option: DeliveryOption::Pickup,
            payment_method: PaymentMethod::Gateway,
            items: OrderLines::default(),
            status,
        }
    }

    fn signed_body(handle: &str, paid: bool) -> Vec<u8> {
        json!({
            "resultado": [{
                "pagado": paid,
                "hash_pedido": handle,
                "token": callback_token(KEY, handle),
            }]
        })
        .to_string()
        .into_bytes()
    }

    #[rstest]
    #[case(OrderStatus::PendienteDePago, true, Some(OrderStatus::Pagado))]
    #[case(OrderStatus::Procesando, true, Some(OrderStatus::Pagado))]
    #[case(OrderStatus::Pagado, true, None)]
    #[case(OrderStatus::Enviado, true, None)]
    #[case(OrderStatus::PendienteDePago, false, Some(OrderStatus::Procesando))]
    #[case(OrderStatus::Procesando, false, None)]
    #[case(OrderStatus::Pagado, false, None)]
    #[case(OrderStatus::Enviado, false, None)]
    fn callbacks_only_move_orders_forward(
        #[case] current: OrderStatus,
        #[case] paid: bool,
        #[case] expected: Option<OrderStatus>,
    ) {
        let order = new_order(current);
        let model = OrderModel {
            id: Uuid::new_v4(),
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            customer_phone: order.customer_phone,
            shipping_address: order.shipping_address,
            shipping_city: order.shipping_city,
            delivery_option: order.delivery_option,
            payment_method: order.payment_method,
            total: order.items.total(),
            items: order.items,
            status: current,
            transaction_handle: Some("h".into()),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            version: 1,
        };
        assert_eq!(target_status(&model, paid), expected);
    }

    #[tokio::test]
    async fn refused_write_answers_500_and_reports_permission_failure() {
        let inner = Arc::new(InMemoryOrderStore::new());
        let id = inner
            .create(new_order(OrderStatus::PendienteDePago))
            .await
            .unwrap();
        inner
            .update(id, OrderPatch::transaction_handle("hash-ro"))
            .await
            .unwrap();
        let before = inner.get(id).await.unwrap().unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let reconciler = WebhookReconciler::new(
            Arc::new(ReadOnlyStore(inner.clone())),
            Arc::new(EventSender::new(tx)),
            Some(KEY.to_string()),
        );

        let outcome = reconciler
            .handle_callback(&signed_body("hash-ro", true))
            .await;

        assert_eq!(outcome.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(outcome.body, json!({ "error": "internal error" }));
        assert_eq!(inner.get(id).await.unwrap().unwrap(), before);
        assert_matches!(rx.recv().await, Some(Event::PermissionDenied { .. }));
    }

    #[test]
    fn parses_boolean_and_string_flags() {
        let body = br#"{"respuesta":true,"resultado":[{"pagado":"true","hash_pedido":"h","token":"t"}]}"#;
        let (callback, echo) = parse_callback(body).unwrap();
        assert!(callback.paid);
        assert_eq!(callback.hash_pedido, "h");
        assert!(echo.is_array());

        let body = br#"{"resultado":[{"pagado":false,"hash_pedido":"h","token":"t"}]}"#;
        assert!(!parse_callback(body).unwrap().0.paid);
    }

    #[test]
    fn rejects_wrong_shapes() {
        let cases: [&[u8]; 6] = [
            b"not json",
            br#"{"respuesta":true}"#,
            br#"{"resultado":[]}"#,
            br#"{"resultado":{"pagado":true}}"#,
            br#"{"resultado":[{"pagado":1,"hash_pedido":"h","token":"t"}]}"#,
            br#"{"resultado":[{"pagado":true,"token":"t"}]}"#,
        ];
        for body in cases {
            assert!(parse_callback(body).is_none(), "{:?}", String::from_utf8_lossy(body));
        }
    }
}
