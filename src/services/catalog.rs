use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    entities::ProductModel,
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{NewProduct, ProductChanges, ProductRepository},
};

const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 100;

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() || price.is_zero() {
        return Err(ValidationError::new("price_must_be_positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(custom = "validate_price")]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub on_sale: bool,
    #[validate(range(min = 0))]
    pub stock: i32,
    #[validate(url)]
    pub image_url: Option<String>,
}

/// Catalog edit; absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    #[validate(custom = "validate_price")]
    pub sale_price: Option<Decimal>,
    pub on_sale: Option<bool>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    #[validate(url)]
    pub image_url: Option<String>,
}

/// Product catalog reads and back-office writes.
#[derive(Clone)]
pub struct ProductCatalogService {
    products: Arc<ProductRepository>,
    event_sender: Arc<EventSender>,
}

impl ProductCatalogService {
    pub fn new(products: Arc<ProductRepository>, event_sender: Arc<EventSender>) -> Self {
        Self {
            products,
            event_sender,
        }
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        self.products
            .find(product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    pub async fn list_products(
        &self,
        category: Option<&str>,
        page: u64,
        limit: Option<u64>,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        self.products.list(category, page.max(1), limit).await
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;
        check_sale_price(input.price, input.sale_price)?;

        let product = self
            .products
            .create(NewProduct {
                name: input.name.trim().to_string(),
                description: input.description,
                category: input.category.filter(|c| !c.trim().is_empty()),
                price: input.price,
                sale_price: input.sale_price,
                on_sale: input.on_sale,
                stock: input.stock,
                image_url: input.image_url,
            })
            .await?;

        info!(product_id = %product.id, "Product created");
        self.event_sender
            .send_or_log(Event::ProductCreated(product.id))
            .await;

        Ok(product)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;

        if input.price.is_some() || input.sale_price.is_some() {
            let current = self.get_product(product_id).await?;
            check_sale_price(
                input.price.unwrap_or(current.price),
                input.sale_price.or(current.sale_price),
            )?;
        }

        let product = self
            .products
            .update(
                product_id,
                ProductChanges {
                    name: input.name.map(|n| n.trim().to_string()),
                    description: input.description,
                    category: input
                        .category
                        .map(|c| Some(c.trim().to_string()).filter(|c| !c.is_empty())),
                    price: input.price,
                    sale_price: input.sale_price.map(Some),
                    on_sale: input.on_sale,
                    stock: input.stock,
                    image_url: input.image_url.map(Some),
                },
            )
            .await?;

        info!(product_id = %product.id, "Product updated");
        self.event_sender
            .send_or_log(Event::ProductUpdated(product.id))
            .await;

        Ok(product)
    }
}

fn check_sale_price(price: Decimal, sale_price: Option<Decimal>) -> Result<(), ServiceError> {
    match sale_price {
        Some(sale) if sale > price => Err(ServiceError::ValidationError(
            "Sale price cannot exceed list price".to_string(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use assert_matches::assert_matches;
    use tokio::sync::mpsc;

    async fn service() -> ProductCatalogService {
        let pool = db::establish_connection_with_config(&db::DbConfig {
            url: "sqlite::memory:".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        db::create_schema(&pool).await.unwrap();
        let (tx, _rx) = mpsc::channel(8);
        ProductCatalogService::new(
            Arc::new(ProductRepository::new(Arc::new(pool))),
            Arc::new(EventSender::new(tx)),
        )
    }

    fn input() -> CreateProductInput {
        CreateProductInput {
            name: "Guampa".into(),
            description: "Guampa de palo santo".into(),
            category: Some("Hogar".into()),
            price: Decimal::from(45_000),
            sale_price: None,
            on_sale: false,
            stock: 8,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn rejects_invalid_products() {
        let service = service().await;

        let mut free = input();
        free.price = Decimal::ZERO;
        assert_matches!(
            service.create_product(free).await,
            Err(ServiceError::ValidationError(_))
        );

        let mut negative_stock = input();
        negative_stock.stock = -1;
        assert_matches!(
            service.create_product(negative_stock).await,
            Err(ServiceError::ValidationError(_))
        );

        let mut pricey_sale = input();
        pricey_sale.sale_price = Some(Decimal::from(50_000));
        assert_matches!(
            service.create_product(pricey_sale).await,
            Err(ServiceError::ValidationError(_))
        );
    }

    #[tokio::test]
    async fn update_checks_sale_price_against_current_price() {
        let service = service().await;
        let product = service.create_product(input()).await.unwrap();

        let result = service
            .update_product(
                product.id,
                UpdateProductInput {
                    sale_price: Some(Decimal::from(60_000)),
                    ..Default::default()
                },
            )
            .await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));

        let updated = service
            .update_product(
                product.id,
                UpdateProductInput {
                    sale_price: Some(Decimal::from(40_000)),
                    on_sale: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.on_sale);
        assert_eq!(updated.sale_price, Some(Decimal::from(40_000)));
    }

    #[tokio::test]
    async fn limit_is_clamped() {
        let service = service().await;
        service.create_product(input()).await.unwrap();
        let (products, total) = service.list_products(None, 0, Some(1_000)).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(products.len(), 1);
    }
}
