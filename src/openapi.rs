use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::OrderStatus;
use crate::errors::ErrorResponse;
use crate::services::carts::{CartLineView, CartView};
use crate::services::orders::{OrderLineInput, OrderLineView, OrderView};
use crate::services::ProductSummary;

/// OpenAPI document for the storefront API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "storefront-api",
        description = "Storefront backend: catalog, per-user carts and the cart-to-order consistency engine.",
        license(name = "MIT")
    ),
    components(schemas(
        ErrorResponse,
        ProductSummary,
        CartView,
        CartLineView,
        OrderView,
        OrderLineView,
        OrderLineInput,
        OrderStatus,
    ))
)]
pub struct ApiDoc;

/// Swagger UI served at `/docs`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
