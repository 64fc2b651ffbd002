//! Liveness endpoint.

use crate::api::AppState;
use axum::Json;
use axum::extract::State;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub database: DatabaseHealth,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub engine: String,
    /// Whether the shared pool has been created yet. Health checks never
    /// create it.
    pub pool_initialized: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider = state.dispatcher.provider();
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        database: DatabaseHealth {
            engine: provider.db_type().to_string(),
            pool_initialized: provider.is_initialized().await,
        },
    })
}
