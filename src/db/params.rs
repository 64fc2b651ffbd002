//! Parameter binding utilities for routine calls.
//!
//! These functions bind `RoutineParam` values to database-specific query
//! objects. Statement text decides which name each placeholder belongs to;
//! binding only has to follow the placeholder order.

use crate::models::RoutineParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres};

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q RoutineParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        RoutineParam::Null => query.bind(None::<String>),
        RoutineParam::Bool(v) => query.bind(*v),
        RoutineParam::Int(v) => query.bind(*v),
        RoutineParam::Float(v) => query.bind(*v),
        RoutineParam::String(v) => query.bind(v.as_str()),
        RoutineParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q RoutineParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        RoutineParam::Null => query.bind(None::<String>),
        RoutineParam::Bool(v) => query.bind(*v),
        RoutineParam::Int(v) => query.bind(*v),
        RoutineParam::Float(v) => query.bind(*v),
        RoutineParam::String(v) => query.bind(v.as_str()),
        RoutineParam::Json(v) => query.bind(Json(v)),
    }
}
