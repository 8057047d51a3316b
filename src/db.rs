use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::gauge;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

/// Establishes a connection pool to the database
pub async fn establish_connection(database_url: &str) -> Result<DbPool, DbErr> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };

    establish_connection_with_config(&config).await
}

/// Establishes a connection pool using the application configuration
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    let config = DbConfig {
        url: cfg.database_url.clone(),
        max_connections: cfg.db_max_connections,
        min_connections: cfg.db_min_connections,
        connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
        idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
        acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
    };

    establish_connection_with_config(&config).await
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!(
        "storefront_db.max_connections",
        config.max_connections as f64
    );

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    Database::connect(opt).await
}

/// Applies all pending schema migrations.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    info!("Running database migrations");
    crate::migrator::Migrator::up(db, None).await
}

/// Verifies the database connection is alive.
pub async fn ping_database(db: &DatabaseConnection) -> Result<(), DbErr> {
    db.ping().await
}

/// Whether a database error is a transient conflict worth retrying:
/// a lock/busy timeout or a serialization failure under concurrent
/// transactions. Constraint violations and other logic errors are not
/// transient.
pub fn is_transient_error(err: &DbErr) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("database is locked")
        || msg.contains("database table is locked")
        || msg.contains("deadlock")
        || msg.contains("could not serialize")
        || msg.contains("serialization failure")
        || msg.contains("40001")
}

/// Runs a fallible transactional operation, retrying a bounded number of
/// times when the store reports a transient conflict. Business failures
/// pass through untouched on the first occurrence.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    max_attempts: u32,
    mut f: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match f().await {
            Err(ServiceError::DatabaseError(err))
                if is_transient_error(&err) && attempt < max_attempts =>
            {
                warn!(
                    operation,
                    attempt,
                    error = %err,
                    "transient store conflict, retrying"
                );
                tokio::time::sleep(Duration::from_millis(20 * u64::from(attempt))).await;
            }
            Err(ServiceError::DatabaseError(err)) if is_transient_error(&err) => {
                warn!(
                    operation,
                    attempt,
                    error = %err,
                    "transient store conflict, retries exhausted"
                );
                return Err(ServiceError::InternalError(format!(
                    "{} failed after {} attempts",
                    operation, attempt
                )));
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn transient_errors_are_recognised() {
        assert!(is_transient_error(&DbErr::Custom(
            "database is locked".into()
        )));
        assert!(is_transient_error(&DbErr::Custom(
            "ERROR: could not serialize access due to concurrent update".into()
        )));
        assert!(!is_transient_error(&DbErr::Custom(
            "UNIQUE constraint failed: shopping_carts.user_id".into()
        )));
    }

    #[tokio::test]
    async fn with_retry_retries_transient_conflicts() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, ServiceError> = with_retry("test_op", 3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ServiceError::DatabaseError(DbErr::Custom(
                        "database is locked".into(),
                    )))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_passes_business_errors_through() {
        let calls = AtomicU32::new(0);

        let result: Result<(), ServiceError> = with_retry("test_op", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::InsufficientStock("no stock".into())) }
        })
        .await;

        assert!(matches!(result, Err(ServiceError::InsufficientStock(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_retry_exhausts_into_generic_failure() {
        let result: Result<(), ServiceError> = with_retry("test_op", 2, || async {
            Err(ServiceError::DatabaseError(DbErr::Custom(
                "database is locked".into(),
            )))
        })
        .await;

        assert!(matches!(result, Err(ServiceError::InternalError(_))));
    }
}
