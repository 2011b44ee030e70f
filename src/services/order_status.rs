use std::str::FromStr;
use std::sync::Arc;

use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    entities::{OrderModel, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{OrderPatch, OrderStore},
};

const VALID_STATUSES: &[&str] = &[
    "Procesando",
    "Pendiente de Pago",
    "Pagado",
    "Enviado",
    "Entregado",
    "Cancelado",
];

/// Manual status changes from the back office.
#[derive(Clone)]
pub struct OrderStatusService {
    orders: Arc<dyn OrderStore>,
    event_sender: Arc<EventSender>,
}

impl OrderStatusService {
    pub fn new(orders: Arc<dyn OrderStore>, event_sender: Arc<EventSender>) -> Self {
        Self {
            orders,
            event_sender,
        }
    }

    /// Sets the status of an order.
    ///
    /// Any non-terminal order may be moved to any status. Orders already
    /// `Entregado` or `Cancelado` only accept their current status. Writes are
    /// last-write-wins against concurrent webhook deliveries.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn set_status(
        &self,
        order_id: Uuid,
        new_status: &str,
    ) -> Result<OrderModel, ServiceError> {
        let status = OrderStatus::from_str(new_status.trim()).map_err(|_| {
            error!("Invalid order status: {}", new_status);
            ServiceError::InvalidStatus(format!(
                "Invalid status: {}. Valid statuses are: {:?}",
                new_status, VALID_STATUSES
            ))
        })?;

        let order = self.orders.get(order_id).await?.ok_or_else(|| {
            error!("Order {} not found", order_id);
            ServiceError::NotFound(format!("Order {} not found", order_id))
        })?;

        let old_status = order.status;
        if !old_status.can_transition_to(status) {
            error!(
                "Invalid status transition from {} to {}",
                old_status, status
            );
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot transition from status '{}' to '{}'",
                old_status, status
            )));
        }

        let updated = match self.orders.update(order_id, OrderPatch::status(status)).await {
            Ok(updated) => updated,
            Err(e) => {
                error!("Failed to update order {} status: {}", order_id, e);
                if e.is_permission_denied() {
                    self.event_sender
                        .send_or_log(Event::PermissionDenied {
                            operation: format!("set status of order {}", order_id),
                            detail: e.to_string(),
                        })
                        .await;
                }
                return Err(e);
            }
        };

        info!(
            "Order {} status updated from '{}' to '{}'",
            order_id, old_status, status
        );
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status: status,
            })
            .await;

        Ok(updated)
    }
}
