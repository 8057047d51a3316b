#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use storefront_api::{
    auth::{AuthConfig, AuthService, AuthUser, ROLE_ADMIN, ROLE_USER},
    config::AppConfig,
    db,
    entities::{category, product},
    events::{self, EventSender},
    handlers::AppServices,
    AppState,
};

/// Password shared by every user the harness registers.
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Helper harness for spinning up an application state backed by a
/// file-based SQLite database in a temp directory.
pub struct TestApp {
    pub state: Arc<AppState>,
    pub auth_service: Arc<AuthService>,
    _db_dir: tempfile::TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = db_dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(
            AuthConfig::new(cfg.jwt_secret.clone(), Duration::from_secs(3600)),
            db_arc.clone(),
        ));
        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            cfg.db_conflict_retries,
        );

        let state = Arc::new(AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
            auth: auth_service.clone(),
        });

        Self {
            state,
            auth_service,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    /// Router mirroring the binary's composition, for HTTP-level tests.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", axum::routing::get(storefront_api::health))
            .nest("/api/v1", storefront_api::api_v1_routes())
            .nest(
                "/api/v1/auth",
                storefront_api::auth::auth_routes().with_state(self.auth_service.clone()),
            )
            .layer(axum::middleware::from_fn_with_state(
                self.auth_service.clone(),
                |axum::extract::State(auth): axum::extract::State<Arc<AuthService>>,
                 mut req: axum::extract::Request,
                 next: axum::middleware::Next| async move {
                    req.extensions_mut().insert(auth);
                    next.run(req).await
                },
            ))
            .with_state(self.state.clone())
    }

    /// Register a user through the identity provider and return its
    /// resolved identity.
    pub async fn register_user(&self, username: &str) -> AuthUser {
        let user = self
            .auth_service
            .register(username, &format!("{}@example.com", username), TEST_PASSWORD)
            .await
            .expect("failed to register user");

        AuthUser {
            id: user.id,
            username: user.username,
            email: user.email,
            roles: vec![ROLE_USER.to_string()],
        }
    }

    /// Register a user and grant it ROLE_ADMIN.
    pub async fn register_admin(&self, username: &str) -> AuthUser {
        let mut user = self.register_user(username).await;
        self.auth_service
            .grant_role(user.id, ROLE_ADMIN)
            .await
            .expect("failed to grant admin role");
        user.roles.push(ROLE_ADMIN.to_string());
        user
    }

    /// Mint a bearer token for a previously registered user.
    pub async fn token_for(&self, username: &str) -> String {
        self.auth_service
            .login(username, TEST_PASSWORD)
            .await
            .expect("failed to log in")
            .access_token
    }

    /// Insert a category directly into the store.
    pub async fn seed_category(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        category::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            description: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed category");
        id
    }

    /// Insert a product with the given price and stock.
    pub async fn seed_product(
        &self,
        category_id: Uuid,
        name: &str,
        price: Decimal,
        stock_quantity: i32,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(None),
            image_url: Set(Some(format!("https://img.example.com/{}.png", name))),
            price: Set(price),
            stock_quantity: Set(stock_quantity),
            category_id: Set(category_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed product")
    }
}
