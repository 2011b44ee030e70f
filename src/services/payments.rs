use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    entities::OrderStatus,
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{OrderPatch, OrderStore},
    services::payment_gateway::{PaymentGateway, PaymentInitiation},
};

/// Starts online payment for placed orders.
///
/// Creating the gateway transaction and attaching its handle are two
/// separate writes. If the second one fails the order stays in
/// `Pendiente de Pago` without a handle and `initiate` can simply be called
/// again. Once a handle is stored it is reused, so repeated calls never open
/// a second gateway transaction for the same order.
#[derive(Clone)]
pub struct PaymentService {
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    return_base_url: Option<String>,
}

impl PaymentService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        return_base_url: Option<String>,
    ) -> Self {
        Self {
            orders,
            gateway,
            event_sender,
            return_base_url,
        }
    }

    #[instrument(skip(self))]
    pub async fn initiate(&self, order_id: Uuid) -> Result<PaymentInitiation, ServiceError> {
        let return_base_url = self
            .return_base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                ServiceError::GatewayConfiguration("return base URL missing".to_string())
            })?;

        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status != OrderStatus::PendienteDePago {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is {}, not awaiting payment",
                order_id, order.status
            )));
        }

        if let Some(handle) = order.transaction_handle.as_deref() {
            info!(
                order_id = %order_id,
                transaction_handle = %handle,
                "Reusing existing payment transaction"
            );
            return Ok(PaymentInitiation {
                redirect_url: self.gateway.redirect_url(handle),
                transaction_handle: handle.to_string(),
            });
        }

        let initiation = self
            .gateway
            .create_payment_order(&order, return_base_url)
            .await?;

        self.orders
            .update(
                order_id,
                OrderPatch::transaction_handle(initiation.transaction_handle.clone()),
            )
            .await
            .map_err(|e| {
                error!(
                    order_id = %order_id,
                    transaction_handle = %initiation.transaction_handle,
                    error = %e,
                    "Gateway transaction created but handle could not be stored"
                );
                e
            })?;

        info!(order_id = %order_id, "Payment initiated");
        self.event_sender
            .send_or_log(Event::PaymentInitiated {
                order_id,
                transaction_handle: initiation.transaction_handle.clone(),
            })
            .await;

        Ok(initiation)
    }
}
