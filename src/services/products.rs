use crate::{
    entities::{cart_item, order_item, product, CartItem, Category, OrderItem, Product},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Catalog store for products.
///
/// Administrative writes live here; stock is only ever *decremented* by the
/// order engine. Setting a negative stock or price through this service is
/// rejected up front.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Lists products, newest first, optionally filtered by category.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
        category_id: Option<Uuid>,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let mut query = Product::find().order_by_desc(product::Column::CreatedAt);
        if let Some(category_id) = category_id {
            query = query.filter(product::Column::CategoryId.eq(category_id));
        }

        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((products, total))
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        validate_price_and_stock(input.price, input.stock_quantity)?;

        Category::find_by_id(input.category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Category {} not found", input.category_id))
            })?;

        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            description: Set(input.description),
            image_url: Set(input.image_url),
            price: Set(input.price),
            stock_quantity: Set(input.stock_quantity),
            category_id: Set(input.category_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let product = product.insert(&*self.db).await?;
        info!(product_id = %product.id, name = %product.name, "created product");
        Ok(product)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        let product = self.get_product(product_id).await?;

        if let Some(price) = input.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::InvalidInput(
                    "price cannot be negative".to_string(),
                ));
            }
        }
        if let Some(stock_quantity) = input.stock_quantity {
            if stock_quantity < 0 {
                return Err(ServiceError::InvalidInput(
                    "stock quantity cannot be negative".to_string(),
                ));
            }
        }
        if let Some(category_id) = input.category_id {
            Category::find_by_id(category_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Category {} not found", category_id))
                })?;
        }

        let mut update: product::ActiveModel = product.into();
        if let Some(name) = input.name {
            update.name = Set(name);
        }
        if let Some(description) = input.description {
            update.description = Set(Some(description));
        }
        if let Some(image_url) = input.image_url {
            update.image_url = Set(Some(image_url));
        }
        if let Some(price) = input.price {
            update.price = Set(price);
        }
        if let Some(stock_quantity) = input.stock_quantity {
            update.stock_quantity = Set(stock_quantity);
        }
        if let Some(category_id) = input.category_id {
            update.category_id = Set(category_id);
        }
        update.updated_at = Set(Utc::now());

        Ok(update.update(&*self.db).await?)
    }

    /// Deletes a product. Products referenced by order lines cannot be
    /// removed — order history is immutable. Cart lines referencing the
    /// product are dropped in the same transaction.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let product = self.get_product(product_id).await?;

        let ordered = OrderItem::find()
            .filter(order_item::Column::ProductId.eq(product_id))
            .count(&*self.db)
            .await?;
        if ordered > 0 {
            return Err(ServiceError::Conflict(format!(
                "Product {} is referenced by existing orders",
                product.name
            )));
        }

        let txn = self.db.begin().await?;
        CartItem::delete_many()
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;
        product.delete(&txn).await?;
        txn.commit().await?;

        info!(product_id = %product_id, "deleted product");
        Ok(())
    }
}

fn validate_price_and_stock(price: Decimal, stock_quantity: i32) -> Result<(), ServiceError> {
    if price < Decimal::ZERO {
        return Err(ServiceError::InvalidInput(
            "price cannot be negative".to_string(),
        ));
    }
    if stock_quantity < 0 {
        return Err(ServiceError::InvalidInput(
            "stock quantity cannot be negative".to_string(),
        ));
    }
    Ok(())
}

/// Input for creating a product
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub stock_quantity: i32,
    pub category_id: Uuid,
}

/// Input for updating a product; absent fields stay unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<Decimal>,
    pub stock_quantity: Option<i32>,
    pub category_id: Option<Uuid>,
}
