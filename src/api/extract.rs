//! Request extractors.

use crate::api::error::ApiError;
use crate::controller::RequestBag;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Query, RawPathParams, Request};
use serde_json::{Map, Value};
use std::collections::HashMap;

impl<S: Send + Sync> FromRequest<S> for RequestBag {
    type Rejection = ApiError;

    /// Collect path parameters, query string and JSON body. Path and query
    /// values arrive as strings; an empty body counts as no body.
    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();

        // Routes without captures have no path parameters.
        let path: Map<String, Value> = match RawPathParams::from_request_parts(&mut parts, state).await
        {
            Ok(params) => params
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
            Err(_) => Map::new(),
        };

        let Query(query) = Query::<HashMap<String, String>>::from_request_parts(&mut parts, state)
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid query string: {}", e)))?;
        let query = query
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();

        let bytes = Bytes::from_request(Request::from_parts(parts, body), state)
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read body: {}", e)))?;
        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?,
            )
        };

        Ok(RequestBag { path, query, body })
    }
}
