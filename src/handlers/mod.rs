pub mod carts;
pub mod categories;
pub mod common;
pub mod orders;
pub mod products;

use crate::auth::{AuthRouterExt, ROLE_ADMIN};
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{CartService, CategoryService, OrderService, ProductService};
use axum::Router;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<ProductService>,
    pub categories: Arc<CategoryService>,
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, conflict_retries: u32) -> Self {
        let products = Arc::new(ProductService::new(db.clone()));
        let categories = Arc::new(CategoryService::new(db.clone()));
        let carts = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let orders = Arc::new(OrderService::new(db, event_sender, conflict_retries));

        Self {
            products,
            categories,
            carts,
            orders,
        }
    }
}

/// Full v1 API router. Cart and order routes require authentication;
/// admin routes additionally require ROLE_ADMIN. Role gating lives here in
/// the transport layer — the engines themselves only check ownership.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/products", products::products_routes())
        .nest("/categories", categories::categories_routes())
        .nest("/carts", carts::carts_routes().with_auth())
        .nest("/orders", orders::orders_routes().with_auth())
        .nest(
            "/admin/products",
            products::admin_products_routes().with_role(ROLE_ADMIN),
        )
        .nest(
            "/admin/categories",
            categories::admin_categories_routes().with_role(ROLE_ADMIN),
        )
        .nest(
            "/admin/orders",
            orders::admin_orders_routes().with_role(ROLE_ADMIN),
        )
}
