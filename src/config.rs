//! Configuration handling for the gateway.
//!
//! Settings come from CLI arguments with environment variable fallbacks and
//! are read once at startup.

use crate::models::{ConnectionConfig, ConnectionConfigError, DatabaseType};
use clap::{Args, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 3000;

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_NAME: &str = "cadastro_bancos";
pub const DEFAULT_DB_USER: &str = "postgres";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Origins allowed by the HTTP layer outside production.
pub const DEVELOPMENT_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:3001",
    "http://localhost:5173",
];

/// Connection pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Hard cap on simultaneous connections.
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub min_connections: u32,
    /// Idle connections are closed after this many seconds.
    pub idle_timeout_secs: u64,
    /// How long a caller waits for a free connection.
    pub acquire_timeout_secs: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolOptions {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }
        if self.min_connections > self.max_connections {
            return Err(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                self.min_connections, self.max_connections
            ));
        }
        if self.acquire_timeout_secs == 0 {
            return Err("acquire_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Deployment environment. Changes TLS trust and CORS defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AppEnvironment {
    #[default]
    Development,
    Production,
}

impl AppEnvironment {
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Origins the HTTP layer accepts. Production only allows what was
    /// configured explicitly.
    pub fn allowed_origins(&self, configured: &[String]) -> Vec<String> {
        match self {
            Self::Development => DEVELOPMENT_ORIGINS.iter().map(|s| s.to_string()).collect(),
            Self::Production => configured.to_vec(),
        }
    }
}

impl std::fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    /// Connection URL; when set, overrides the individual DB_* settings
    #[arg(long = "database-url", env = "DATABASE_URL", hide_env_values = true)]
    pub url: Option<String>,

    /// Database engine
    #[arg(long = "db-engine", value_enum, default_value = "postgres", env = "DB_ENGINE")]
    pub engine: DatabaseType,

    /// Database server host
    #[arg(long = "db-server", default_value = DEFAULT_DB_HOST, env = "DB_SERVER")]
    pub host: String,

    /// Database server port (defaults to the engine's standard port)
    #[arg(long = "db-port", env = "DB_PORT")]
    pub port: Option<u16>,

    /// Database name (file path for sqlite)
    #[arg(long = "db-name", default_value = DEFAULT_DB_NAME, env = "DB_NAME")]
    pub database: String,

    #[arg(long = "db-user", default_value = DEFAULT_DB_USER, env = "DB_USER")]
    pub user: String,

    #[arg(
        long = "db-password",
        default_value = "",
        env = "DB_PASSWORD",
        hide_env_values = true
    )]
    pub password: String,

    /// Require TLS for database connections
    #[arg(long = "db-encrypt", env = "DB_ENCRYPT")]
    pub encrypt: bool,

    /// Trust self-signed server certificates (default: true in development)
    #[arg(long = "db-trust-server-certificate", env = "DB_TRUST_SERVER_CERTIFICATE")]
    pub trust_server_certificate: Option<bool>,

    #[arg(long = "db-pool-max", default_value_t = DEFAULT_MAX_CONNECTIONS, env = "DB_POOL_MAX")]
    pub pool_max: u32,

    #[arg(long = "db-pool-min", default_value_t = DEFAULT_MIN_CONNECTIONS, env = "DB_POOL_MIN")]
    pub pool_min: u32,

    /// Seconds before an idle pooled connection is closed
    #[arg(
        long = "db-pool-idle-timeout",
        default_value_t = DEFAULT_IDLE_TIMEOUT_SECS,
        env = "DB_POOL_IDLE_TIMEOUT_SECS"
    )]
    pub idle_timeout_secs: u64,

    /// Seconds to wait for a free pooled connection
    #[arg(
        long = "db-pool-acquire-timeout",
        default_value_t = DEFAULT_ACQUIRE_TIMEOUT_SECS,
        env = "DB_POOL_ACQUIRE_TIMEOUT_SECS"
    )]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseArgs {
    fn default() -> Self {
        Self {
            url: None,
            engine: DatabaseType::PostgreSQL,
            host: DEFAULT_DB_HOST.to_string(),
            port: None,
            database: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: String::new(),
            encrypt: false,
            trust_server_certificate: None,
            pool_max: DEFAULT_MAX_CONNECTIONS,
            pool_min: DEFAULT_MIN_CONNECTIONS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl DatabaseArgs {
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.pool_max,
            min_connections: self.pool_min,
            idle_timeout_secs: self.idle_timeout_secs,
            acquire_timeout_secs: self.acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "sproc-gateway", version, about)]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Deployment environment
    #[arg(long, value_enum, default_value = "development", env = "APP_ENV")]
    pub environment: AppEnvironment,

    /// HTTP host to bind to
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "GATEWAY_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "PORT")]
    pub http_port: u16,

    /// Allowed CORS origins in production (comma-separated)
    #[arg(long = "cors-origin", env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "GATEWAY_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "GATEWAY_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            database: DatabaseArgs::default(),
            environment: AppEnvironment::Development,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            cors_origins: Vec::new(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Resolve the database settings into a pool configuration.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConnectionConfigError> {
        let db = &self.database;
        let trust = db
            .trust_server_certificate
            .unwrap_or_else(|| self.environment.is_development());

        if let Some(url) = &db.url {
            return ConnectionConfig::from_url(url, db.pool_options());
        }

        let config = ConnectionConfig::new(
            db.engine,
            &db.host,
            db.port,
            &db.database,
            &db.user,
            &db.password,
            db.pool_options(),
        )?;
        Ok(config.with_tls(db.encrypt, trust))
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.environment.allowed_origins(&self.cors_origins)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
