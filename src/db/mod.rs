//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool lifecycle
//! - Routine signature lookup and call rendering
//! - Routine dispatch and result shaping
//! - Caller-owned transactions
//! - Row decoding

pub mod catalog;
pub mod dispatcher;
pub(crate) mod params;
pub mod pool;
pub mod transaction;
pub mod types;

pub use dispatcher::{Dispatcher, shape_result};
pub use pool::{DbPool, PoolProvider};
pub use transaction::RoutineTransaction;
