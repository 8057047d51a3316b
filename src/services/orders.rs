use crate::{
    auth::AuthUser,
    db,
    entities::{
        cart_item, customer_order, order_item, product, shopping_cart, user, CartItem,
        CustomerOrder, OrderItem, OrderStatus, Product, ShoppingCart, User,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::ProductSummary,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order engine: the one place stock is authoritatively committed and an
/// immutable purchase record is produced.
///
/// Stock commitment uses a guarded decrement (`UPDATE .. SET stock_quantity
/// = stock_quantity - q WHERE id = ? AND stock_quantity >= q`) and checks
/// the affected-row count, so two orders racing on the same product can
/// never drive the value negative — whichever transaction applies second
/// sees the already-reduced stock. The whole check-and-decrement plus order
/// creation is a single transaction: any line failing rolls back every
/// earlier decrement in the same call.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    conflict_retries: u32,
}

struct PlacedOrder {
    order: customer_order::Model,
    items: Vec<order_item::Model>,
    products: HashMap<Uuid, product::Model>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        conflict_retries: u32,
    ) -> Self {
        Self {
            db,
            event_sender,
            conflict_retries,
        }
    }

    /// Places an order for an explicit list of (product, quantity) lines.
    ///
    /// All-or-nothing: if any line fails (unknown product, bad quantity,
    /// not enough stock) no stock anywhere is decremented and no order row
    /// is created. Transient store conflicts retry the whole attempt a
    /// bounded number of times.
    #[instrument(skip(self, user, lines), fields(user_id = %user.id, line_count = lines.len()))]
    pub async fn place_order(
        &self,
        user: &AuthUser,
        lines: Vec<OrderLineInput>,
    ) -> Result<OrderView, ServiceError> {
        validate_lines(&lines)?;

        let placed = db::with_retry("place_order", self.conflict_retries, || async {
            let txn = self.db.begin().await?;
            let placed = self.place_order_in_txn(&txn, user, &lines).await?;
            txn.commit().await?;
            Ok(placed)
        })
        .await?;

        self.publish_order_events(&placed).await;
        info!(
            order_id = %placed.order.id,
            total = %placed.order.total_amount,
            "placed order"
        );

        Ok(view_from_parts(
            placed.order,
            placed.items,
            &placed.products,
            user.username.clone(),
        ))
    }

    /// Places an order from the caller's cart, consuming its lines.
    ///
    /// The cart-to-order conversion is one transaction: the stock commit,
    /// the order insert and the cart-line deletion succeed or fail
    /// together. The cart row itself survives, empty.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn place_order_from_cart(&self, user: &AuthUser) -> Result<OrderView, ServiceError> {
        let cart = ShoppingCart::find()
            .filter(shopping_cart::Column::UserId.eq(user.id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::InvalidInput("cart is empty".to_string()))?;

        let placed = db::with_retry("place_order_from_cart", self.conflict_retries, || async {
            let txn = self.db.begin().await?;

            let cart_items = CartItem::find()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .order_by_asc(cart_item::Column::CreatedAt)
                .all(&txn)
                .await?;

            if cart_items.is_empty() {
                return Err(ServiceError::InvalidInput("cart is empty".to_string()));
            }

            let lines: Vec<OrderLineInput> = cart_items
                .iter()
                .map(|item| OrderLineInput {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect();

            let placed = self.place_order_in_txn(&txn, user, &lines).await?;

            CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .exec(&txn)
                .await?;

            let mut cart_update: shopping_cart::ActiveModel = cart.clone().into();
            cart_update.last_modified_date = Set(Utc::now());
            cart_update.update(&txn).await?;

            txn.commit().await?;
            Ok(placed)
        })
        .await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart.id))
            .await;
        self.publish_order_events(&placed).await;
        info!(
            order_id = %placed.order.id,
            cart_id = %cart.id,
            "placed order from cart"
        );

        Ok(view_from_parts(
            placed.order,
            placed.items,
            &placed.products,
            user.username.clone(),
        ))
    }

    /// Check-and-decrement plus order creation, inside the caller's
    /// transaction. Lines are processed in submission order.
    async fn place_order_in_txn(
        &self,
        txn: &DatabaseTransaction,
        user: &AuthUser,
        lines: &[OrderLineInput],
    ) -> Result<PlacedOrder, ServiceError> {
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let mut total_amount = Decimal::ZERO;
        let mut item_models = Vec::with_capacity(lines.len());
        let mut products = HashMap::new();

        for line in lines {
            let product = Product::find_by_id(line.product_id)
                .one(txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;

            // The guarded decrement is the authoritative stock check: it
            // only applies when enough stock remains at write time, which
            // closes the read-check-write race between concurrent orders.
            let result = Product::update_many()
                .col_expr(
                    product::Column::StockQuantity,
                    Expr::col(product::Column::StockQuantity).sub(line.quantity),
                )
                .filter(product::Column::Id.eq(line.product_id))
                .filter(product::Column::StockQuantity.gte(line.quantity))
                .exec(txn)
                .await?;

            if result.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "Insufficient stock for product {}: available {}, requested {}",
                    product.name, product.stock_quantity, line.quantity
                )));
            }

            total_amount += product.price * Decimal::from(line.quantity);
            item_models.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                quantity: Set(line.quantity),
                // Frozen here; later price changes never touch this line.
                price_at_purchase: Set(product.price),
                created_at: Set(now),
            });
            products.insert(product.id, product);
        }

        let order = customer_order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!(
                "ORD-{}",
                order_id.to_string()[..8].to_uppercase()
            )),
            user_id: Set(user.id),
            order_date: Set(now),
            status: Set(OrderStatus::Pending),
            total_amount: Set(total_amount),
            updated_at: Set(None),
        }
        .insert(txn)
        .await?;

        let mut items = Vec::with_capacity(item_models.len());
        for item in item_models {
            items.push(item.insert(txn).await?);
        }

        Ok(PlacedOrder {
            order,
            items,
            products,
        })
    }

    /// All orders owned by the caller, newest first.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn get_orders_for_user(
        &self,
        user: &AuthUser,
    ) -> Result<Vec<OrderView>, ServiceError> {
        let orders = CustomerOrder::find()
            .filter(customer_order::Column::UserId.eq(user.id))
            .order_by_desc(customer_order::Column::OrderDate)
            .all(&*self.db)
            .await?;

        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            views.push(self.load_view(order, user.username.clone()).await?);
        }
        Ok(views)
    }

    /// One order, visible only to its owner.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn get_order_for_user(
        &self,
        user: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderView, ServiceError> {
        let order = CustomerOrder::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.user_id != user.id {
            return Err(ServiceError::Forbidden(
                "order belongs to a different user".to_string(),
            ));
        }

        self.load_view(order, user.username.clone()).await
    }

    /// Administrative: all orders, newest first, paginated.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderView>, u64), ServiceError> {
        let paginator = CustomerOrder::find()
            .order_by_desc(customer_order::Column::OrderDate)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let usernames = self.usernames_for(&orders).await?;
        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            let username = usernames
                .get(&order.user_id)
                .cloned()
                .unwrap_or_else(|| order.user_id.to_string());
            views.push(self.load_view(order, username).await?);
        }
        Ok((views, total))
    }

    /// Administrative: one order, unrestricted by owner.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = CustomerOrder::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let username = self.username_for(order.user_id).await?;
        self.load_view(order, username).await
    }

    /// Administrative status transition.
    ///
    /// Any status may be set to any other — the permissiveness is
    /// deliberate pending a product decision on an allowed-transition
    /// table; every transition is logged with its old and new value.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: &str,
    ) -> Result<OrderView, ServiceError> {
        let new_status = OrderStatus::from_str(new_status).map_err(|_| {
            ServiceError::InvalidInput(format!("unrecognised order status: {}", new_status))
        })?;

        let order = CustomerOrder::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        let mut update: customer_order::ActiveModel = order.into();
        update.status = Set(new_status);
        update.updated_at = Set(Some(Utc::now()));
        let updated = update.update(&*self.db).await?;

        info!(
            order_id = %order_id,
            old_status = %old_status,
            new_status = %new_status,
            "order status updated"
        );
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        let username = self.username_for(updated.user_id).await?;
        self.load_view(updated, username).await
    }

    async fn publish_order_events(&self, placed: &PlacedOrder) {
        self.event_sender
            .send_or_log(Event::OrderCreated(placed.order.id))
            .await;
        for item in &placed.items {
            self.event_sender
                .send_or_log(Event::StockCommitted {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    order_id: placed.order.id,
                })
                .await;
        }
    }

    async fn load_view(
        &self,
        order: customer_order::Model,
        username: String,
    ) -> Result<OrderView, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::CreatedAt)
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

        Ok(view_from_parts(order, items, &products, username))
    }

    async fn username_for(&self, user_id: Uuid) -> Result<String, ServiceError> {
        Ok(User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .map(|u| u.username)
            .unwrap_or_else(|| user_id.to_string()))
    }

    async fn usernames_for(
        &self,
        orders: &[customer_order::Model],
    ) -> Result<HashMap<Uuid, String>, ServiceError> {
        let user_ids: Vec<Uuid> = orders.iter().map(|o| o.user_id).collect();
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        Ok(User::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect())
    }
}

fn validate_lines(lines: &[OrderLineInput]) -> Result<(), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::InvalidInput(
            "order must contain at least one item".to_string(),
        ));
    }
    for line in lines {
        if line.quantity < 1 {
            return Err(ServiceError::InvalidInput(format!(
                "quantity for product {} must be at least 1",
                line.product_id
            )));
        }
    }
    Ok(())
}

fn view_from_parts(
    order: customer_order::Model,
    items: Vec<order_item::Model>,
    products: &HashMap<Uuid, product::Model>,
    username: String,
) -> OrderView {
    let lines = items
        .into_iter()
        .map(|item| {
            let product = products
                .get(&item.product_id)
                .map(ProductSummary::from)
                .unwrap_or(ProductSummary {
                    id: item.product_id,
                    name: String::new(),
                    image_url: None,
                });
            let subtotal = item.price_at_purchase * Decimal::from(item.quantity);
            OrderLineView {
                id: item.id,
                product,
                quantity: item.quantity,
                price_at_purchase: item.price_at_purchase,
                subtotal,
            }
        })
        .collect();

    OrderView {
        id: order.id,
        order_number: order.order_number,
        username,
        order_date: order.order_date,
        status: order.status,
        total_amount: order.total_amount,
        items: lines,
    }
}

/// One requested order line
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Order read model with frozen price snapshots
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub order_number: String,
    pub username: String,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub items: Vec<OrderLineView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineView {
    pub id: Uuid,
    pub product: ProductSummary,
    pub quantity: i32,
    pub price_at_purchase: Decimal,
    pub subtotal: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_order_is_rejected() {
        let err = validate_lines(&[]).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        for quantity in [0, -1, -50] {
            let lines = vec![OrderLineInput {
                product_id: Uuid::new_v4(),
                quantity,
            }];
            let err = validate_lines(&lines).unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }
    }

    #[test]
    fn single_positive_line_passes_validation() {
        let lines = vec![OrderLineInput {
            product_id: Uuid::new_v4(),
            quantity: 1,
        }];
        assert!(validate_lines(&lines).is_ok());
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let total = dec!(19.99) * Decimal::from(3) + dec!(5.25) * Decimal::from(2);
        assert_eq!(total, dec!(70.47));
    }

    proptest! {
        // Totals computed with decimals are exact sums of line subtotals:
        // no drift no matter how many lines or how awkward the cents.
        #[test]
        fn order_total_equals_sum_of_subtotals(
            lines in proptest::collection::vec((1u32..10_000, 1i32..100), 1..20)
        ) {
            let mut total = Decimal::ZERO;
            let mut subtotals = Vec::new();
            for (cents, quantity) in &lines {
                let price = Decimal::new(i64::from(*cents), 2);
                let subtotal = price * Decimal::from(*quantity);
                subtotals.push(subtotal);
                total += subtotal;
            }
            let recomputed: Decimal = subtotals.iter().copied().sum();
            prop_assert_eq!(total, recomputed);
        }
    }
}
