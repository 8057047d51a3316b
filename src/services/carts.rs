use crate::{
    auth::AuthUser,
    entities::{cart_item, product, shopping_cart, CartItem, Product, ShoppingCart},
    errors::ServiceError,
    events::{Event, EventSender},
    services::ProductSummary,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Cart engine: maintains a per-user mutable working set of
/// (product, quantity) pairs.
///
/// The cart never commits stock. Its stock checks are advisory — they stop
/// obviously impossible quantities at mutation time but reserve nothing,
/// so a concurrent order can invalidate them. Authoritative commitment
/// happens once, in the order engine. The cart always resolves against the
/// live product price; prices are never stored on cart lines.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the caller's cart, creating an empty one on first access.
    ///
    /// The unique index on `shopping_carts.user_id` arbitrates concurrent
    /// first accesses; the loser of that race re-reads the winner's row.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn get_or_create_cart(
        &self,
        user: &AuthUser,
    ) -> Result<shopping_cart::Model, ServiceError> {
        if let Some(cart) = self.find_cart(user.id).await? {
            return Ok(cart);
        }

        let now = Utc::now();
        let cart = shopping_cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.id),
            created_at: Set(now),
            last_modified_date: Set(now),
        };

        match cart.insert(&*self.db).await {
            Ok(cart) => {
                self.event_sender
                    .send_or_log(Event::CartCreated(cart.id))
                    .await;
                info!(cart_id = %cart.id, "created cart");
                Ok(cart)
            }
            Err(err) => match self.find_cart(user.id).await? {
                // Lost the creation race; the constraint kept the invariant.
                Some(cart) => Ok(cart),
                None => Err(err.into()),
            },
        }
    }

    /// Adds a product to the caller's cart, merging into an existing line.
    ///
    /// The resulting line quantity is checked against current stock. The
    /// check is advisory only — it does not reserve anything.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn add_item(
        &self,
        user: &AuthUser,
        input: AddItemInput,
    ) -> Result<CartView, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::InvalidInput(
                "quantity must be at least 1".to_string(),
            ));
        }

        let cart = self.get_or_create_cart(user).await?;
        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&txn)
            .await?;

        let resulting_quantity = existing.as_ref().map_or(0, |item| item.quantity) + input.quantity;

        if product.stock_quantity < resulting_quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Not enough stock for product {}: available {}, requested {}",
                product.name, product.stock_quantity, resulting_quantity
            )));
        }

        match existing {
            Some(item) => {
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(resulting_quantity);
                item.updated_at = Set(Utc::now());
                item.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(input.product_id),
                    quantity: Set(input.quantity),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                }
                .insert(&txn)
                .await?;
            }
        }

        self.touch_cart(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: input.product_id,
                quantity: input.quantity,
            })
            .await;

        info!(
            cart_id = %cart.id,
            product_id = %input.product_id,
            quantity = input.quantity,
            "added item to cart"
        );
        self.view_cart(user).await
    }

    /// Sets a cart line's quantity. Zero deletes the line; the line must
    /// belong to the caller's cart.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn update_item_quantity(
        &self,
        user: &AuthUser,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::InvalidInput(
                "quantity cannot be negative".to_string(),
            ));
        }

        let cart = self.get_or_create_cart(user).await?;
        let txn = self.db.begin().await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if item.cart_id != cart.id {
            return Err(ServiceError::Forbidden(
                "cart item does not belong to the caller's cart".to_string(),
            ));
        }

        if quantity == 0 {
            CartItem::delete_by_id(item_id).exec(&txn).await?;
        } else {
            let product = Product::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;

            // Advisory, like add_item.
            if product.stock_quantity < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Not enough stock for product {}: available {}, requested {}",
                    product.name, product.stock_quantity, quantity
                )));
            }

            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        }

        self.touch_cart(&txn, cart.id).await?;
        txn.commit().await?;

        let event = if quantity == 0 {
            Event::CartItemRemoved {
                cart_id: cart.id,
                item_id,
            }
        } else {
            Event::CartItemUpdated {
                cart_id: cart.id,
                item_id,
                quantity,
            }
        };
        self.event_sender.send_or_log(event).await;

        self.view_cart(user).await
    }

    /// Deletes a cart line after the same ownership check.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn remove_item(
        &self,
        user: &AuthUser,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(user).await?;
        let txn = self.db.begin().await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if item.cart_id != cart.id {
            return Err(ServiceError::Forbidden(
                "cart item does not belong to the caller's cart".to_string(),
            ));
        }

        CartItem::delete_by_id(item_id).exec(&txn).await?;
        self.touch_cart(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.id,
                item_id,
            })
            .await;

        self.view_cart(user).await
    }

    /// Deletes all lines from the caller's cart. Clearing an already-empty
    /// cart is a no-op, not an error; the cart row itself always survives.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn clear_cart(&self, user: &AuthUser) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(user).await?;
        let txn = self.db.begin().await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        self.touch_cart(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart.id))
            .await;

        info!(cart_id = %cart.id, "cleared cart");
        self.view_cart(user).await
    }

    /// Read model of the caller's cart, computed fresh from current product
    /// state — prices and subtotals are never cached.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn view_cart(&self, user: &AuthUser) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_cart(user).await?;

        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let product_ids: Vec<Uuid> = items.iter().map(|item| item.product_id).collect();
        let products: HashMap<Uuid, product::Model> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            Product::find()
                .filter(product::Column::Id.is_in(product_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect()
        };

        let mut lines = Vec::with_capacity(items.len());
        let mut total_amount = Decimal::ZERO;
        let mut total_items = 0;

        for item in items {
            let product = products.get(&item.product_id).ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "product {} missing for cart line {}",
                    item.product_id, item.id
                ))
            })?;

            let subtotal = product.price * Decimal::from(item.quantity);
            total_amount += subtotal;
            total_items += item.quantity;

            lines.push(CartLineView {
                id: item.id,
                product: ProductSummary::from(product),
                quantity: item.quantity,
                unit_price: product.price,
                subtotal,
            });
        }

        Ok(CartView {
            id: cart.id,
            user_id: user.id,
            username: user.username.clone(),
            items: lines,
            total_amount,
            total_items,
            last_modified: cart.last_modified_date,
        })
    }

    async fn find_cart(
        &self,
        user_id: Uuid,
    ) -> Result<Option<shopping_cart::Model>, ServiceError> {
        Ok(ShoppingCart::find()
            .filter(shopping_cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?)
    }

    /// Every successful mutation updates the cart's last-modified stamp.
    async fn touch_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        let mut cart: shopping_cart::ActiveModel = ShoppingCart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?
            .into();

        cart.last_modified_date = Set(Utc::now());
        cart.update(conn).await?;
        Ok(())
    }
}

/// Input for adding an item to the caller's cart
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Cart read model with live prices
#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub items: Vec<CartLineView>,
    pub total_amount: Decimal,
    pub total_items: i32,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartLineView {
    pub id: Uuid,
    pub product: ProductSummary,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}
