use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{DeliveryOption, OrderLines, OrderStatus, PaymentMethod},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{NewOrder, OrderStore, ProductRepository},
    services::cart::{Cart, CartChange, CartSessions},
};

/// Address recorded on orders collected at the store.
pub const PICKUP_ADDRESS: &str = "Retiro en tienda";

const MIN_ADDRESS_LEN: usize = 5;
const MIN_CITY_LEN: usize = 2;

/// Customer contact and shipping fields entered at checkout.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CheckoutForm {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl CheckoutForm {
    fn trimmed(self) -> Self {
        let trim_opt = |v: Option<String>| v.map(|s| s.trim().to_string());
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            address: trim_opt(self.address),
            city: trim_opt(self.city),
        }
    }
}

/// One product/quantity pair of a counter sale.
#[derive(Debug, Clone, Deserialize)]
pub struct SaleLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Turns carts into persisted orders.
#[derive(Clone)]
pub struct CheckoutService {
    orders: Arc<dyn OrderStore>,
    products: Arc<ProductRepository>,
    sessions: Arc<CartSessions>,
    event_sender: Arc<EventSender>,
    store_city: String,
}

impl CheckoutService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        products: Arc<ProductRepository>,
        sessions: Arc<CartSessions>,
        event_sender: Arc<EventSender>,
        store_city: impl Into<String>,
    ) -> Self {
        Self {
            orders,
            products,
            sessions,
            event_sender,
            store_city: store_city.into(),
        }
    }

    /// Places an order from `cart` and empties it.
    ///
    /// The cart is cleared only after the store accepts the order; on any
    /// failure it is left as it was.
    ///
    /// # Arguments
    ///
    /// * `cart` - Cart to convert
    /// * `form` - Customer contact and, for deliveries, shipping fields
    /// * `delivery` - Home delivery or store pickup
    /// * `payment` - Online gateway or pay on delivery; decides the initial status
    ///
    /// # Returns
    ///
    /// The new order's id
    #[instrument(skip(self, cart, form), fields(lines = cart.lines().len()))]
    pub async fn submit(
        &self,
        cart: &mut Cart,
        form: CheckoutForm,
        delivery: DeliveryOption,
        payment: PaymentMethod,
    ) -> Result<Uuid, ServiceError> {
        let form = form.trimmed();
        form.validate()?;

        let (shipping_address, shipping_city) = self.shipping_fields(&form, delivery)?;

        if cart.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }

        let items = OrderLines(cart.order_lines());
        let status = OrderStatus::initial_for(payment);
        let total = items.total();

        let order_id = self
            .orders
            .create(NewOrder {
                customer_name: form.name,
                customer_email: form.email,
                customer_phone: form.phone,
                shipping_address,
                shipping_city,
                delivery_option: delivery,
                payment_method: payment,
                items,
                status,
            })
            .await?;

        cart.clear();

        info!(order_id = %order_id, total = %total, status = %status, "Order placed");
        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id,
                total,
                status,
            })
            .await;

        Ok(order_id)
    }

    /// Checks out the cart held in session `cart_id`; the session is closed
    /// once the order exists.
    pub async fn submit_session(
        &self,
        cart_id: Uuid,
        form: CheckoutForm,
        delivery: DeliveryOption,
        payment: PaymentMethod,
    ) -> Result<Uuid, ServiceError> {
        let mut cart = self
            .sessions
            .get(cart_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let order_id = self.submit(&mut cart, form, delivery, payment).await?;

        self.sessions.remove(cart_id);
        self.event_sender
            .send_or_log(Event::CartCleared(cart_id))
            .await;

        Ok(order_id)
    }

    /// Records a counter sale: picked up at the store and paid in person, so
    /// the order starts in `Procesando`.
    #[instrument(skip(self, lines, form))]
    pub async fn record_sale(
        &self,
        lines: Vec<SaleLine>,
        form: CheckoutForm,
    ) -> Result<Uuid, ServiceError> {
        let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products = self.products.find_many(&ids).await?;

        let mut cart = Cart::new();
        for line in lines {
            let product = products
                .iter()
                .find(|p| p.id == line.product_id)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;

            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for {} must be at least 1",
                    product.name
                )));
            }

            match cart.add(product, line.quantity) {
                CartChange::Added(_) => {}
                CartChange::Clamped(available) => {
                    warn!(product_id = %product.id, available, "Sale quantity exceeds stock");
                    return Err(ServiceError::ValidationError(format!(
                        "Only {} units of {} in stock",
                        available, product.name
                    )));
                }
                CartChange::Rejected => {
                    return Err(ServiceError::ValidationError(format!(
                        "{} is out of stock",
                        product.name
                    )));
                }
            }
        }

        self.submit(
            &mut cart,
            form,
            DeliveryOption::Pickup,
            PaymentMethod::OnDelivery,
        )
        .await
    }

    fn shipping_fields(
        &self,
        form: &CheckoutForm,
        delivery: DeliveryOption,
    ) -> Result<(String, String), ServiceError> {
        match delivery {
            DeliveryOption::Pickup => Ok((PICKUP_ADDRESS.to_string(), self.store_city.clone())),
            DeliveryOption::Delivery => {
                let address = form.address.clone().unwrap_or_default();
                let city = form.city.clone().unwrap_or_default();

                if address.chars().count() < MIN_ADDRESS_LEN {
                    return Err(ServiceError::ValidationError(format!(
                        "Address must be at least {} characters",
                        MIN_ADDRESS_LEN
                    )));
                }
                if city.chars().count() < MIN_CITY_LEN {
                    return Err(ServiceError::ValidationError(format!(
                        "City must be at least {} characters",
                        MIN_CITY_LEN
                    )));
                }

                Ok((address, city))
            }
        }
    }
}
