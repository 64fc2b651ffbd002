//! Connection pool management.
//!
//! The gateway talks to one database through one pool. `PoolProvider` owns
//! that pool: it is created on first use, shared by every dispatch, and closed
//! exactly once on shutdown.

use crate::db::transaction::RoutineTransaction;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{MySqlPool, PgPool, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            DbPool::MySql(pool) => pool.is_closed(),
            DbPool::Postgres(pool) => pool.is_closed(),
            DbPool::SQLite(pool) => pool.is_closed(),
        }
    }

    /// How long a checkout waits for a free connection.
    pub fn acquire_timeout(&self) -> Duration {
        match self {
            DbPool::MySql(pool) => pool.options().get_acquire_timeout(),
            DbPool::Postgres(pool) => pool.options().get_acquire_timeout(),
            DbPool::SQLite(pool) => pool.options().get_acquire_timeout(),
        }
    }

    /// Map a failed checkout, reporting the configured wait on timeout.
    pub(crate) fn acquire_error(&self, err: sqlx::Error) -> DbError {
        match err {
            sqlx::Error::PoolTimedOut => {
                DbError::timeout("connection pool acquire", self.acquire_timeout().as_secs())
            }
            other => other.into(),
        }
    }
}

/// Owner of the process-wide connection pool.
///
/// `acquire` and `release` are the only ways to reach the pool. Creation
/// happens under a lock, so concurrent first callers share one pool.
#[derive(Debug)]
pub struct PoolProvider {
    config: ConnectionConfig,
    pool: Mutex<Option<Arc<DbPool>>>,
}

impl PoolProvider {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            pool: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn db_type(&self) -> DatabaseType {
        self.config.db_type
    }

    /// Return the live pool, creating it on first use.
    ///
    /// # Errors
    ///
    /// `DbError::Connection` when the server is unreachable or rejects the
    /// credentials. Nothing is cached on failure; the next call retries.
    pub async fn acquire(&self) -> DbResult<Arc<DbPool>> {
        let mut slot = self.pool.lock().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(Arc::clone(pool));
        }

        info!(
            target_db = %self.config.display_target(),
            max_connections = self.config.pool_options.max_connections,
            "Creating database connection pool"
        );

        let pool = Arc::new(create_pool(&self.config).await?);
        *slot = Some(Arc::clone(&pool));

        info!(db_type = %pool.db_type(), "Database connection pool created");
        Ok(pool)
    }

    /// Close the pool and forget it. Safe to call when no pool exists.
    pub async fn release(&self) {
        let pool = self.pool.lock().await.take();
        match pool {
            Some(pool) => {
                pool.close().await;
                info!("Database connection pool closed");
            }
            None => debug!("No database connection pool to close"),
        }
    }

    /// Whether a pool currently exists.
    pub async fn is_initialized(&self) -> bool {
        self.pool.lock().await.is_some()
    }

    /// Begin a transaction on the shared pool.
    pub async fn begin(&self) -> DbResult<RoutineTransaction> {
        let pool = self.acquire().await?;
        RoutineTransaction::begin(&pool).await
    }
}

/// Create a connection pool for the given configuration.
async fn create_pool(config: &ConnectionConfig) -> DbResult<DbPool> {
    let pool_opts = &config.pool_options;
    let idle_timeout = Some(pool_opts.idle_timeout());
    let connect_error = |e: sqlx::Error| {
        DbError::connection(
            format!("Failed to connect: {}", e),
            connection_suggestion(config.db_type, &e),
        )
    };

    match config.db_type {
        DatabaseType::PostgreSQL => {
            let ssl_mode = match (config.encrypt, config.trust_server_certificate) {
                (false, _) => PgSslMode::Disable,
                (true, true) => PgSslMode::Require,
                (true, false) => PgSslMode::VerifyFull,
            };
            let mut options = PgConnectOptions::new()
                .host(&config.host)
                .username(&config.user)
                .password(&config.password)
                .database(&config.database)
                .ssl_mode(ssl_mode);
            if let Some(port) = config.effective_port() {
                options = options.port(port);
            }

            let pool = PgPoolOptions::new()
                .min_connections(pool_opts.min_connections)
                .max_connections(pool_opts.max_connections)
                .acquire_timeout(pool_opts.acquire_timeout())
                .idle_timeout(idle_timeout)
                .connect_with(options)
                .await
                .map_err(connect_error)?;
            Ok(DbPool::Postgres(pool))
        }
        DatabaseType::MySQL => {
            let ssl_mode = match (config.encrypt, config.trust_server_certificate) {
                (false, _) => MySqlSslMode::Disabled,
                (true, true) => MySqlSslMode::Required,
                (true, false) => MySqlSslMode::VerifyIdentity,
            };
            let mut options = MySqlConnectOptions::new()
                .host(&config.host)
                .username(&config.user)
                .password(&config.password)
                .database(&config.database)
                .ssl_mode(ssl_mode)
                .charset("utf8mb4");
            if let Some(port) = config.effective_port() {
                options = options.port(port);
            }

            let pool = MySqlPoolOptions::new()
                .min_connections(pool_opts.min_connections)
                .max_connections(pool_opts.max_connections)
                .acquire_timeout(pool_opts.acquire_timeout())
                .idle_timeout(idle_timeout)
                .connect_with(options)
                .await
                .map_err(connect_error)?;
            Ok(DbPool::MySql(pool))
        }
        DatabaseType::SQLite => {
            let options = SqliteConnectOptions::new()
                .filename(&config.database)
                .create_if_missing(true);

            let pool = SqlitePoolOptions::new()
                .min_connections(pool_opts.min_connections)
                .max_connections(pool_opts.max_connections)
                .acquire_timeout(pool_opts.acquire_timeout())
                .idle_timeout(idle_timeout)
                .connect_with(options)
                .await
                .map_err(connect_error)?;
            Ok(DbPool::SQLite(pool))
        }
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("timed out") {
        return format!(
            "Check that the {} server is running and reachable at DB_SERVER:DB_PORT",
            db_type
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify DB_USER and DB_PASSWORD".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that DB_NAME exists on the server".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check DB_ENCRYPT and DB_TRUST_SERVER_CERTIFICATE".to_string();
    }

    match db_type {
        DatabaseType::SQLite => "Verify the DB_NAME file path is writable".to_string(),
        _ => "Verify the database settings (DB_SERVER, DB_PORT, DB_NAME)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;

    fn sqlite_provider(path: &str) -> PoolProvider {
        PoolProvider::new(ConnectionConfig::sqlite(path, PoolOptions::default()).unwrap())
    }

    #[tokio::test]
    async fn test_provider_starts_empty() {
        let provider = sqlite_provider("unused.db");
        assert!(!provider.is_initialized().await);
        assert_eq!(provider.db_type(), DatabaseType::SQLite);
    }

    #[tokio::test]
    async fn test_release_without_pool_is_noop() {
        let provider = sqlite_provider("unused.db");
        provider.release().await;
        provider.release().await;
        assert!(!provider.is_initialized().await);
    }

    #[test]
    fn test_connection_suggestion_refused() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        let suggestion = connection_suggestion(DatabaseType::PostgreSQL, &err);
        assert!(suggestion.contains("PostgreSQL server is running"));
    }

    #[test]
    fn test_connection_suggestion_fallback() {
        let err = sqlx::Error::Protocol("unexpected packet".to_string());
        let suggestion = connection_suggestion(DatabaseType::MySQL, &err);
        assert!(suggestion.contains("DB_SERVER"));
    }
}
