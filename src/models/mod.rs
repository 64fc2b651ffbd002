//! Data models for the gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod routine;
pub mod security;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType};
pub use routine::{
    DispatchOutput, ExpectedReturn, NamedResultSets, ResultSet, RoutineParam, RoutineParams, Row,
};
pub use security::{Credential, Permission, SecurityRule};
