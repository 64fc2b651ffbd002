//! Request field validation.
//!
//! `primitives` holds the reusable per-field rules; `schema` composes them
//! into typed request shapes.

pub mod primitives;
pub mod schema;

pub use schema::{FieldIssue, FieldReader, NoFields, Schema, parse};
