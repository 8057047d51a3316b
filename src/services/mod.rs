pub mod carts;
pub mod categories;
pub mod orders;
pub mod products;

pub use carts::CartService;
pub use categories::CategoryService;
pub use orders::OrderService;
pub use products::ProductService;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::product;

/// Compact product projection embedded in cart and order views.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub image_url: Option<String>,
}

impl From<&product::Model> for ProductSummary {
    fn from(product: &product::Model) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            image_url: product.image_url.clone(),
        }
    }
}
