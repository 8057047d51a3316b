use crate::handlers::common::{created_response, success_response, PaginatedResponse, PaginationParams};
use crate::{auth::AuthUser, errors::ServiceError, services::orders::OrderLineInput, AppState};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Extension, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Routes for the caller's own orders.
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(place_order).get(my_orders))
        .route("/from-cart", post(place_order_from_cart))
        .route("/:id", get(my_order))
}

/// Administrative order routes, gated on ROLE_ADMIN by the caller.
pub fn admin_orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_status))
}

/// Place an order for an explicit item list
async fn place_order(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .place_order(&user, payload.items)
        .await?;

    Ok(created_response(order))
}

/// Place an order from the caller's cart contents
async fn place_order_from_cart(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.place_order_from_cart(&user).await?;
    Ok(created_response(order))
}

/// The caller's orders, newest first
async fn my_orders(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, ServiceError> {
    let orders = state.services.orders.get_orders_for_user(&user).await?;
    Ok(success_response(orders))
}

/// One of the caller's orders
async fn my_order(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .get_order_for_user(&user, order_id)
        .await?;
    Ok(success_response(order))
}

/// Administrative: list all orders
async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Response, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(pagination.page, pagination.per_page)
        .await?;

    Ok(success_response(PaginatedResponse::new(
        orders,
        pagination.page,
        pagination.per_page,
        total,
    )))
}

/// Administrative: fetch any order
async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(order_id).await?;
    Ok(success_response(order))
}

/// Administrative: transition an order's status
async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .update_status(order_id, &payload.status)
        .await?;
    Ok(success_response(order))
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLineInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}
