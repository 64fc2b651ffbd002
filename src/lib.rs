//! Stored-procedure gateway library.
//!
//! Validates CRUD requests against typed schemas and dispatches them to
//! stored routines on PostgreSQL or MySQL through one shared connection pool.

pub mod api;
pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod models;
pub mod server;
pub mod validation;

pub use config::Config;
pub use controller::{CrudController, RequestBag, ValidationError, ValidationResult};
pub use db::{Dispatcher, PoolProvider};
pub use error::{DbError, DbResult};
