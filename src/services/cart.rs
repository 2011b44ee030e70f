use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::entities::{OrderLine, ProductModel, ProductSnapshot};
use crate::errors::ServiceError;

/// One product in the cart. `stock` is the catalog stock seen when the line
/// was last touched and bounds the quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub product: ProductSnapshot,
    pub quantity: i32,
    pub stock: i32,
}

impl CartLine {
    pub fn unit_price(&self) -> Decimal {
        self.product.unit_price()
    }

    pub fn subtotal(&self) -> Decimal {
        self.unit_price() * Decimal::from(self.quantity)
    }
}

/// Result of [`Cart::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartChange {
    /// Line quantity is now the given value
    Added(i32),
    /// Request exceeded stock; line quantity capped at the given value
    Clamped(i32),
    /// Product has no stock; cart untouched
    Rejected,
}

/// Session-owned list of products awaiting checkout.
///
/// Quantities always stay within `[1, stock]`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` units of `product`, merging with an existing line and
    /// capping the result at the product's stock.
    pub fn add(&mut self, product: &ProductModel, quantity: i32) -> CartChange {
        let stock = product.stock.max(0);
        let requested = quantity.max(1);

        if stock == 0 {
            return CartChange::Rejected;
        }

        let line = match self.lines.iter().position(|l| l.product.id == product.id) {
            Some(index) => &mut self.lines[index],
            None => {
                self.lines.push(CartLine {
                    product: ProductSnapshot::from(product),
                    quantity: 0,
                    stock,
                });
                let last = self.lines.len() - 1;
                &mut self.lines[last]
            }
        };

        line.product = ProductSnapshot::from(product);
        line.stock = stock;

        let wanted = line.quantity.saturating_add(requested);
        if wanted > stock {
            line.quantity = stock;
            CartChange::Clamped(stock)
        } else {
            line.quantity = wanted;
            CartChange::Added(wanted)
        }
    }

    /// Removes the line for `product_id`. Returns whether a line was removed.
    pub fn remove(&mut self, product_id: Uuid) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.product.id != product_id);
        self.lines.len() != before
    }

    /// Sets an explicit quantity. Out-of-range values and unknown products
    /// are rejected and leave the cart unchanged.
    pub fn set_quantity(&mut self, product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product.id == product_id)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("Product {} is not in the cart", product_id))
            })?;

        if quantity < 1 || quantity > line.stock {
            return Err(ServiceError::ValidationError(format!(
                "Quantity must be between 1 and {}",
                line.stock
            )));
        }

        line.quantity = quantity;
        Ok(())
    }

    /// Refreshes a line's snapshot and stock from the catalog, clamping the
    /// quantity if stock shrank. A product now out of stock is dropped.
    pub fn sync_product(&mut self, product: &ProductModel) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.product.id == product.id) {
            line.product = ProductSnapshot::from(product);
            line.stock = product.stock.max(0);
            line.quantity = line.quantity.min(line.stock);
        }
        self.lines.retain(|l| l.quantity > 0);
    }

    pub fn total(&self) -> Decimal {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn item_count(&self) -> i32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Order lines carrying deep copies of each product snapshot.
    pub fn order_lines(&self) -> Vec<OrderLine> {
        self.lines
            .iter()
            .map(|l| OrderLine::new(l.product.clone(), l.quantity))
            .collect()
    }
}

/// Carts keyed by browsing session id.
#[derive(Debug, Default)]
pub struct CartSessions {
    carts: DashMap<Uuid, Cart>,
}

impl CartSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an empty cart and returns its session id.
    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.carts.insert(id, Cart::new());
        debug!(cart_id = %id, "Cart session opened");
        id
    }

    pub fn get(&self, id: Uuid) -> Option<Cart> {
        self.carts.get(&id).map(|c| c.clone())
    }

    /// Runs `f` with exclusive access to the cart.
    pub fn with_cart<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Cart) -> R,
    ) -> Result<R, ServiceError> {
        let mut cart = self
            .carts
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", id)))?;
        Ok(f(cart.value_mut()))
    }

    pub fn remove(&self, id: Uuid) -> Option<Cart> {
        self.carts.remove(&id).map(|(_, cart)| cart)
    }
}
