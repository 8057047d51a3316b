use crate::handlers::common::{no_content_response, success_response, validate_input};
use crate::{auth::AuthUser, errors::ServiceError, services::carts::AddItemInput, AppState};
use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::{delete, get, post, put},
    Extension, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Routes for the caller's cart. The cart is per-user, so no cart id
/// appears in the path — the authenticated identity selects it.
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(view_cart))
        .route("/items", post(add_item))
        .route("/items/:item_id", put(update_item_quantity))
        .route("/items/:item_id", delete(remove_item))
        .route("/clear", post(clear_cart))
}

/// View the caller's cart with live prices
async fn view_cart(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, ServiceError> {
    let cart = state.services.carts.view_cart(&user).await?;
    Ok(success_response(cart))
}

/// Add a product to the caller's cart
async fn add_item(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<AddItemRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    let cart = state
        .services
        .carts
        .add_item(
            &user,
            AddItemInput {
                product_id: payload.product_id,
                quantity: payload.quantity,
            },
        )
        .await?;

    Ok(success_response(cart))
}

/// Set a cart line's quantity (0 removes the line)
async fn update_item_quantity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<Response, ServiceError> {
    let cart = state
        .services
        .carts
        .update_item_quantity(&user, item_id, payload.quantity)
        .await?;

    Ok(success_response(cart))
}

/// Remove a cart line
async fn remove_item(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(item_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.carts.remove_item(&user, item_id).await?;
    Ok(no_content_response())
}

/// Remove every line from the caller's cart
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, ServiceError> {
    let cart = state.services.carts.clear_cart(&user).await?;
    Ok(success_response(cart))
}

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}
