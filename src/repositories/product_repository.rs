use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use super::order_store::map_db_err;
use crate::entities::product::{ActiveModel, Column, Entity as Product, Model};
use crate::errors::ServiceError;

/// Fields for a new catalog entry.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub on_sale: bool,
    pub stock: i32,
    pub image_url: Option<String>,
}

/// Partial catalog edit. A `Some(None)` clears an optional column.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<Option<String>>,
    pub price: Option<Decimal>,
    pub sale_price: Option<Option<Decimal>>,
    pub on_sale: Option<bool>,
    pub stock: Option<i32>,
    pub image_url: Option<Option<String>>,
}

/// Repository for the product catalog
#[derive(Debug, Clone)]
pub struct ProductRepository {
    db: Arc<DatabaseConnection>,
}

impl ProductRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Model>, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(map_db_err)
    }

    pub async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Model>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Product::find()
            .filter(Column::Id.is_in(ids.iter().copied()))
            .all(&*self.db)
            .await
            .map_err(map_db_err)
    }

    /// Products sorted by name, optionally restricted to one category.
    pub async fn list(
        &self,
        category: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<Model>, u64), ServiceError> {
        let mut query = Product::find();
        if let Some(category) = category {
            query = query.filter(Column::Category.eq(category));
        }

        let paginator = query
            .order_by_asc(Column::Name)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await.map_err(map_db_err)?;
        let products = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(map_db_err)?;

        Ok((products, total))
    }

    pub async fn create(&self, product: NewProduct) -> Result<Model, ServiceError> {
        let now = Utc::now();
        let active = ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(product.name),
            description: Set(product.description),
            category: Set(product.category),
            price: Set(product.price),
            sale_price: Set(product.sale_price),
            on_sale: Set(product.on_sale),
            stock: Set(product.stock),
            image_url: Set(product.image_url),
            created_at: Set(now),
            updated_at: Set(now),
        };

        active.insert(&*self.db).await.map_err(map_db_err)
    }

    pub async fn update(&self, id: Uuid, changes: ProductChanges) -> Result<Model, ServiceError> {
        let existing = self
            .find(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        let mut active: ActiveModel = existing.into();
        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(description) = changes.description {
            active.description = Set(description);
        }
        if let Some(category) = changes.category {
            active.category = Set(category);
        }
        if let Some(price) = changes.price {
            active.price = Set(price);
        }
        if let Some(sale_price) = changes.sale_price {
            active.sale_price = Set(sale_price);
        }
        if let Some(on_sale) = changes.on_sale {
            active.on_sale = Set(on_sale);
        }
        if let Some(stock) = changes.stock {
            active.stock = Set(stock);
        }
        if let Some(image_url) = changes.image_url {
            active.image_url = Set(image_url);
        }
        active.updated_at = Set(Utc::now());

        active.update(&*self.db).await.map_err(map_db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use assert_matches::assert_matches;

    async fn repository() -> ProductRepository {
        let pool = db::establish_connection_with_config(&db::DbConfig {
            url: "sqlite::memory:".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        db::create_schema(&pool).await.unwrap();
        ProductRepository::new(Arc::new(pool))
    }

    fn product(name: &str, category: &str) -> NewProduct {
        NewProduct {
            name: name.into(),
            description: String::new(),
            category: Some(category.into()),
            price: Decimal::from(10_000),
            sale_price: None,
            on_sale: false,
            stock: 4,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn create_list_and_filter() {
        let repo = repository().await;
        repo.create(product("Termo", "Hogar")).await.unwrap();
        repo.create(product("Bombilla", "Hogar")).await.unwrap();
        repo.create(product("Yerba", "Almacén")).await.unwrap();

        let (all, total) = repo.list(None, 1, 10).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(all[0].name, "Bombilla");

        let (hogar, total) = repo.list(Some("Hogar"), 1, 10).await.unwrap();
        assert_eq!(total, 2);
        assert!(hogar.iter().all(|p| p.category.as_deref() == Some("Hogar")));
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let repo = repository().await;
        let created = repo.create(product("Termo", "Hogar")).await.unwrap();

        let updated = repo
            .update(
                created.id,
                ProductChanges {
                    price: Some(Decimal::from(12_500)),
                    sale_price: Some(Some(Decimal::from(9_900))),
                    on_sale: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Termo");
        assert_eq!(updated.price, Decimal::from(12_500));
        assert_eq!(updated.sale_price, Some(Decimal::from(9_900)));
        assert!(updated.on_sale);

        let found = repo.find_many(&[created.id, Uuid::new_v4()]).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn updating_missing_product_is_not_found() {
        let repo = repository().await;
        let result = repo.update(Uuid::new_v4(), ProductChanges::default()).await;
        assert_matches!(result, Err(ServiceError::NotFound(_)));
    }
}
