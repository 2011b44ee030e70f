use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Domain events emitted by the order flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        total: Decimal,
        status: OrderStatus,
    },
    CartCleared(Uuid),
    PaymentInitiated {
        order_id: Uuid,
        transaction_handle: String,
    },
    PaymentConfirmed {
        order_id: Uuid,
        transaction_handle: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    WebhookRejected {
        reason: String,
    },
    /// A store write was refused by access control. Listeners render this
    /// as an "insufficient permissions" notice.
    PermissionDenied {
        operation: String,
        detail: String,
    },
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    PaymentSettingsUpdated,
}

/// Drains the event channel, logging every event. Permission failures are
/// logged at error level so they surface in alerting.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PermissionDenied { operation, detail } => {
                error!(operation = %operation, detail = %detail, "Permission denied by store");
            }
            Event::WebhookRejected { reason } => {
                warn!(reason = %reason, "Payment webhook rejected");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    "Order status changed"
                );
            }
            other => info!("Received event: {:?}", other),
        }
    }

    info!("Event channel closed; stopping event processing loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
        assert!(sender.send(Event::PaymentSettingsUpdated).await.is_err());
    }

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();

        sender.send_or_log(Event::CartCleared(order_id)).await;
        sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: OrderStatus::PendienteDePago,
                new_status: OrderStatus::Pagado,
            })
            .await;

        assert!(matches!(rx.recv().await, Some(Event::CartCleared(id)) if id == order_id));
        assert!(matches!(
            rx.recv().await,
            Some(Event::OrderStatusChanged { new_status: OrderStatus::Pagado, .. })
        ));
    }
}
