use crate::handlers::common::{
    created_response, no_content_response, success_response, validate_input,
};
use crate::{
    errors::ServiceError,
    services::categories::{CreateCategoryInput, UpdateCategoryInput},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Public category reads.
pub fn categories_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_categories))
        .route("/:id", get(get_category))
}

/// Administrative category writes, gated on ROLE_ADMIN by the caller.
pub fn admin_categories_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_category))
        .route("/:id", put(update_category))
        .route("/:id", delete(delete_category))
}

async fn list_categories(State(state): State<Arc<AppState>>) -> Result<Response, ServiceError> {
    let categories = state.services.categories.list_categories().await?;
    Ok(success_response(categories))
}

async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(category_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let category = state.services.categories.get_category(category_id).await?;
    Ok(success_response(category))
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;

    let category = state
        .services
        .categories
        .create_category(CreateCategoryInput {
            name: payload.name,
            description: payload.description,
        })
        .await?;

    Ok(created_response(category))
}

async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(category_id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryRequest>,
) -> Result<Response, ServiceError> {
    let category = state
        .services
        .categories
        .update_category(
            category_id,
            UpdateCategoryInput {
                name: payload.name,
                description: payload.description,
            },
        )
        .await?;

    Ok(success_response(category))
}

async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(category_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state
        .services
        .categories
        .delete_category(category_id)
        .await?;
    Ok(no_content_response())
}

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}
