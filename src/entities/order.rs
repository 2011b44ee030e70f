use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

use super::product;

/// Lifecycle states of an order.
///
/// `Entregado` and `Cancelado` are terminal: once there, an order only
/// accepts a re-set of the same status.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "Procesando")]
    #[serde(rename = "Procesando")]
    #[strum(serialize = "Procesando")]
    Procesando,
    #[sea_orm(string_value = "Pendiente de Pago")]
    #[serde(rename = "Pendiente de Pago")]
    #[strum(serialize = "Pendiente de Pago")]
    PendienteDePago,
    #[sea_orm(string_value = "Pagado")]
    #[serde(rename = "Pagado")]
    #[strum(serialize = "Pagado")]
    Pagado,
    #[sea_orm(string_value = "Enviado")]
    #[serde(rename = "Enviado")]
    #[strum(serialize = "Enviado")]
    Enviado,
    #[sea_orm(string_value = "Entregado")]
    #[serde(rename = "Entregado")]
    #[strum(serialize = "Entregado")]
    Entregado,
    #[sea_orm(string_value = "Cancelado")]
    #[serde(rename = "Cancelado")]
    #[strum(serialize = "Cancelado")]
    Cancelado,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Entregado | OrderStatus::Cancelado)
    }

    /// Any non-terminal status may move to any other status; terminal ones
    /// only to themselves.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self == next || !self.is_terminal()
    }

    /// Status a freshly placed order starts in.
    pub fn initial_for(payment_method: PaymentMethod) -> Self {
        match payment_method {
            PaymentMethod::Gateway => OrderStatus::PendienteDePago,
            PaymentMethod::OnDelivery => OrderStatus::Procesando,
        }
    }
}

/// How the goods reach the customer.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryOption {
    #[sea_orm(string_value = "delivery")]
    Delivery,
    #[sea_orm(string_value = "pickup")]
    Pickup,
}

/// How the order is paid.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    /// Paid online through the payment gateway
    #[default]
    #[sea_orm(string_value = "gateway")]
    Gateway,
    /// Paid in cash on delivery or at the counter
    #[sea_orm(string_value = "on_delivery")]
    OnDelivery,
}

/// Copy of the catalog entry taken when the line was added or ordered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub on_sale: bool,
    pub image_url: Option<String>,
}

impl ProductSnapshot {
    /// Sale price when the product is flagged on sale and has one, else list price.
    pub fn unit_price(&self) -> Decimal {
        match (self.on_sale, self.sale_price) {
            (true, Some(sale)) => sale,
            _ => self.price,
        }
    }
}

impl From<&product::Model> for ProductSnapshot {
    fn from(product: &product::Model) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            category: product.category.clone(),
            price: product.price,
            sale_price: product.sale_price,
            on_sale: product.on_sale,
            image_url: product.image_url.clone(),
        }
    }
}

/// One line of a placed order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product: ProductSnapshot,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

impl OrderLine {
    pub fn new(product: ProductSnapshot, quantity: i32) -> Self {
        let unit_price = product.unit_price();
        Self {
            subtotal: unit_price * Decimal::from(quantity),
            unit_price,
            product,
            quantity,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct OrderLines(pub Vec<OrderLine>);

impl OrderLines {
    pub fn total(&self) -> Decimal {
        self.0.iter().map(|line| line.subtotal).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OrderLine> {
        self.0.iter()
    }
}

/// The `orders` table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,

    /// Street address, or the pickup marker for in-store collection.
    pub shipping_address: String,
    pub shipping_city: String,

    pub delivery_option: DeliveryOption,
    pub payment_method: PaymentMethod,

    #[sea_orm(column_type = "Json")]
    pub items: OrderLines,

    /// Sum of line subtotals at creation; never recomputed.
    pub total: Decimal,

    pub status: OrderStatus,

    /// Handle issued by the payment gateway; unique when present.
    #[sea_orm(unique)]
    pub transaction_handle: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Bumped on every write.
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
