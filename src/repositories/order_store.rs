use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::order::{self, ActiveModel as OrderActiveModel, Column, Entity as Order};
use crate::entities::{DeliveryOption, OrderLines, OrderModel, OrderStatus, PaymentMethod};
use crate::errors::ServiceError;

/// Data for an order about to be persisted. The store assigns the id and
/// timestamps and derives the total from the lines.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub shipping_address: String,
    pub shipping_city: String,
    pub delivery_option: DeliveryOption,
    pub payment_method: PaymentMethod,
    pub items: OrderLines,
    pub status: OrderStatus,
}

impl NewOrder {
    fn into_model(self, id: Uuid, now: DateTime<Utc>) -> OrderModel {
        OrderModel {
            id,
            total: self.items.total(),
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            customer_phone: self.customer_phone,
            shipping_address: self.shipping_address,
            shipping_city: self.shipping_city,
            delivery_option: self.delivery_option,
            payment_method: self.payment_method,
            items: self.items,
            status: self.status,
            transaction_handle: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub transaction_handle: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn transaction_handle(handle: impl Into<String>) -> Self {
        Self {
            transaction_handle: Some(handle.into()),
            ..Default::default()
        }
    }
}

/// Equality filters supported by [`OrderStore::query`].
#[derive(Debug, Clone)]
pub enum OrderFilter {
    TransactionHandle(String),
    CustomerEmail(String),
    Status(OrderStatus),
}

/// Persistent collection of orders.
///
/// Writes are last-write-wins: no version check guards `update`.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: NewOrder) -> Result<Uuid, ServiceError>;

    async fn get(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError>;

    /// Matching orders, newest first.
    async fn query(&self, filter: OrderFilter) -> Result<Vec<OrderModel>, ServiceError>;

    async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<OrderModel, ServiceError>;

    /// One page of all orders (1-indexed), newest first, with the total count.
    async fn list(&self, page: u64, per_page: u64)
        -> Result<(Vec<OrderModel>, u64), ServiceError>;
}

/// Translates database failures, keeping access-control refusals and
/// uniqueness violations distinguishable from everything else.
pub(crate) fn map_db_err(err: DbErr) -> ServiceError {
    if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
        return ServiceError::Conflict(detail);
    }

    let message = err.to_string().to_ascii_lowercase();
    if message.contains("permission denied")
        || message.contains("readonly database")
        || message.contains("read-only")
    {
        return ServiceError::PermissionDenied(err.to_string());
    }

    ServiceError::DatabaseError(err)
}

/// [`OrderStore`] backed by the relational database through sea-orm.
#[derive(Debug, Clone)]
pub struct SqlOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SqlOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for SqlOrderStore {
    #[instrument(skip(self, order), fields(email = %order.customer_email))]
    async fn create(&self, order: NewOrder) -> Result<Uuid, ServiceError> {
        let model = order.into_model(Uuid::new_v4(), Utc::now());
        let id = model.id;

        let active = OrderActiveModel {
            id: Set(model.id),
            customer_name: Set(model.customer_name),
            customer_email: Set(model.customer_email),
            customer_phone: Set(model.customer_phone),
            shipping_address: Set(model.shipping_address),
            shipping_city: Set(model.shipping_city),
            delivery_option: Set(model.delivery_option),
            payment_method: Set(model.payment_method),
            items: Set(model.items),
            total: Set(model.total),
            status: Set(model.status),
            transaction_handle: Set(None),
            created_at: Set(model.created_at),
            updated_at: Set(model.updated_at),
            version: Set(model.version),
        };

        active.insert(&*self.db).await.map_err(map_db_err)?;
        debug!(order_id = %id, "Order persisted");
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Order::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(map_db_err)
    }

    async fn query(&self, filter: OrderFilter) -> Result<Vec<OrderModel>, ServiceError> {
        let select = match filter {
            OrderFilter::TransactionHandle(handle) => {
                Order::find().filter(Column::TransactionHandle.eq(handle))
            }
            OrderFilter::CustomerEmail(email) => {
                Order::find().filter(Column::CustomerEmail.eq(email))
            }
            OrderFilter::Status(status) => Order::find().filter(Column::Status.eq(status)),
        };

        select
            .order_by_desc(Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(map_db_err)
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<OrderModel, ServiceError> {
        let existing = Order::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let version = existing.version;
        let mut active: OrderActiveModel = existing.into();
        if let Some(status) = patch.status {
            active.status = Set(status);
        }
        if let Some(handle) = patch.transaction_handle {
            active.transaction_handle = Set(Some(handle));
        }
        active.updated_at = Set(Utc::now());
        active.version = Set(version + 1);

        active.update(&*self.db).await.map_err(map_db_err)
    }

    async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .order_by_desc(Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await.map_err(map_db_err)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(map_db_err)?;

        Ok((orders, total))
    }
}

/// Process-local [`OrderStore`], used for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, OrderModel>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    fn sorted(mut orders: Vec<OrderModel>) -> Vec<OrderModel> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: NewOrder) -> Result<Uuid, ServiceError> {
        let model = order.into_model(Uuid::new_v4(), Utc::now());
        let id = model.id;
        self.orders.insert(id, model);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn query(&self, filter: OrderFilter) -> Result<Vec<OrderModel>, ServiceError> {
        let matches = self
            .orders
            .iter()
            .filter(|entry| {
                let order = entry.value();
                match &filter {
                    OrderFilter::TransactionHandle(handle) => {
                        order.transaction_handle.as_deref() == Some(handle.as_str())
                    }
                    OrderFilter::CustomerEmail(email) => &order.customer_email == email,
                    OrderFilter::Status(status) => order.status == *status,
                }
            })
            .map(|entry| entry.value().clone())
            .collect();

        Ok(Self::sorted(matches))
    }

    async fn update(&self, id: Uuid, patch: OrderPatch) -> Result<OrderModel, ServiceError> {
        if let Some(handle) = patch.transaction_handle.as_deref() {
            let taken = self.orders.iter().any(|entry| {
                *entry.key() != id && entry.value().transaction_handle.as_deref() == Some(handle)
            });
            if taken {
                return Err(ServiceError::Conflict(format!(
                    "transaction handle {} already attached to another order",
                    handle
                )));
            }
        }

        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let order = entry.value_mut();
        if let Some(status) = patch.status {
            order.status = status;
        }
        if let Some(handle) = patch.transaction_handle {
            order.transaction_handle = Some(handle);
        }
        order.updated_at = Utc::now();
        order.version += 1;

        Ok(order.clone())
    }

    async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let all = Self::sorted(self.orders.iter().map(|e| e.value().clone()).collect());
        let total = all.len() as u64;
        let per_page = per_page.max(1);
        let skip = page.saturating_sub(1).saturating_mul(per_page) as usize;

        Ok((
            all.into_iter().skip(skip).take(per_page as usize).collect(),
            total,
        ))
    }
}
