//! Storefront API Library
//!
//! Catalog, per-user shopping carts and the cart-to-order consistency
//! engine: orders commit stock atomically through a guarded decrement and
//! carry frozen price-at-purchase snapshots, while carts stay advisory and
//! always reflect live prices.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
    pub auth: Arc<auth::AuthService>,
}

/// Full v1 API router (mounted under `/api/v1` by the binary).
pub fn api_v1_routes() -> axum::Router<Arc<AppState>> {
    handlers::api_routes()
}

/// Liveness probe: reports whether the store is reachable.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match db::ping_database(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "up" })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database": "down" })),
        ),
    }
}
