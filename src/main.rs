//! Stored-procedure gateway - main entry point.

use clap::Parser;
use sproc_gateway::config::Config;
use sproc_gateway::db::PoolProvider;
use sproc_gateway::server::HttpServer;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    let connection = config.connection_config()?;
    info!(
        environment = %config.environment,
        database = %connection.display_target(),
        "Starting sproc-gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    // The pool is created lazily by the first dispatch.
    let provider = Arc::new(PoolProvider::new(connection));
    let server = HttpServer::new(&config, provider);

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
