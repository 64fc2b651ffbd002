//! HTTP server lifecycle.
//!
//! Binds the listener, serves the router until SIGINT/SIGTERM, then closes
//! the shared connection pool.

use crate::api::{self, AppState};
use crate::config::Config;
use crate::db::{Dispatcher, PoolProvider};
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Time allowed for in-flight requests after a shutdown signal.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpServer {
    provider: Arc<PoolProvider>,
    state: AppState,
    bind_addr: String,
    allowed_origins: Vec<String>,
}

impl HttpServer {
    pub fn new(config: &Config, provider: Arc<PoolProvider>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&provider)));
        Self {
            provider,
            state: AppState::new(dispatcher),
            bind_addr: config.http_bind_addr(),
            allowed_origins: config.allowed_origins(),
        }
    }

    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    /// Serve until a shutdown signal arrives, then release the pool.
    pub async fn run(self) -> DbResult<()> {
        let app = api::router(self.state, &self.allowed_origins);

        let listener = TcpListener::bind(&self.bind_addr).await.map_err(|e| {
            DbError::internal(format!("Failed to bind to {}: {}", self.bind_addr, e))
        })?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_trigger = Arc::clone(&shutdown_notify);
        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_trigger.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        let result = tokio::select! {
            result = server => match result {
                Ok(()) => {
                    info!("HTTP server stopped");
                    Ok(())
                }
                Err(e) => {
                    error!(error = %e, "HTTP server error");
                    Err(DbError::internal(format!("HTTP server error: {}", e)))
                }
            },
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for in-flight requests (send signal again to force exit)"
                );
                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => Ok(()),
        };

        info!("Closing database connections");
        self.provider.release().await;

        result
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
