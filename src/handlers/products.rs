use crate::handlers::common::{
    created_response, no_content_response, success_response, validate_input, PaginatedResponse,
};
use crate::{
    errors::ServiceError,
    services::products::{CreateProductInput, UpdateProductInput},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Public catalog reads.
pub fn products_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
}

/// Administrative catalog writes, gated on ROLE_ADMIN by the caller.
pub fn admin_products_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_product))
        .route("/:id", put(update_product))
        .route("/:id", delete(delete_product))
}

/// List products, optionally filtered by category
async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Response, ServiceError> {
    let (products, total) = state
        .services
        .products
        .list_products(query.page, query.per_page, query.category_id)
        .await?;

    Ok(success_response(PaginatedResponse::new(
        products,
        query.page,
        query.per_page,
        total,
    )))
}

/// Fetch one product
async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let product = state.services.products.get_product(product_id).await?;
    Ok(success_response(product))
}

/// Administrative: create a product
async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    let product = state
        .services
        .products
        .create_product(CreateProductInput {
            name: payload.name,
            description: payload.description,
            image_url: payload.image_url,
            price: payload.price,
            stock_quantity: payload.stock_quantity,
            category_id: payload.category_id,
        })
        .await?;

    Ok(created_response(product))
}

/// Administrative: update a product
async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Response, ServiceError> {
    let product = state
        .services
        .products
        .update_product(
            product_id,
            UpdateProductInput {
                name: payload.name,
                description: payload.description,
                image_url: payload.image_url,
                price: payload.price,
                stock_quantity: payload.stock_quantity,
                category_id: payload.category_id,
            },
        )
        .await?;

    Ok(success_response(product))
}

/// Administrative: delete a product
async fn delete_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.products.delete_product(product_id).await?;
    Ok(no_content_response())
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    pub category_id: Option<Uuid>,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub stock_quantity: i32,
    pub category_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<Decimal>,
    pub stock_quantity: Option<i32>,
    pub category_id: Option<Uuid>,
}
