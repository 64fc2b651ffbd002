//! Caller-owned transactions.
//!
//! A dispatch normally runs on a connection taken fresh from the pool. When
//! several routines must commit or fail together, the caller begins a
//! `RoutineTransaction` and passes it to each dispatch; the dispatcher then
//! runs inside it and never commits or rolls back on the caller's behalf.

use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use sqlx::{MySql, MySqlConnection, PgConnection, Postgres, Sqlite, Transaction};
use tracing::debug;

/// Database-specific transaction wrapper.
pub enum RoutineTransaction {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

/// Borrowed connection a routine call runs on.
pub(crate) enum RoutineConnection<'a> {
    MySql(&'a mut MySqlConnection),
    Postgres(&'a mut PgConnection),
}

impl RoutineTransaction {
    /// Begin a transaction on the given pool.
    pub async fn begin(pool: &DbPool) -> DbResult<Self> {
        let tx = match pool {
            DbPool::MySql(p) => {
                RoutineTransaction::MySql(p.begin().await.map_err(|e| pool.acquire_error(e))?)
            }
            DbPool::Postgres(p) => {
                RoutineTransaction::Postgres(p.begin().await.map_err(|e| pool.acquire_error(e))?)
            }
            DbPool::SQLite(p) => {
                RoutineTransaction::SQLite(p.begin().await.map_err(|e| pool.acquire_error(e))?)
            }
        };
        debug!(db_type = %tx.db_type(), "Transaction started");
        Ok(tx)
    }

    /// Get the database type for this transaction.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            RoutineTransaction::MySql(_) => DatabaseType::MySQL,
            RoutineTransaction::Postgres(_) => DatabaseType::PostgreSQL,
            RoutineTransaction::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        let result = match self {
            RoutineTransaction::MySql(tx) => tx.commit().await,
            RoutineTransaction::Postgres(tx) => tx.commit().await,
            RoutineTransaction::SQLite(tx) => tx.commit().await,
        };
        result.map_err(|e| DbError::transaction(format!("Commit failed: {}", e)))
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> DbResult<()> {
        let result = match self {
            RoutineTransaction::MySql(tx) => tx.rollback().await,
            RoutineTransaction::Postgres(tx) => tx.rollback().await,
            RoutineTransaction::SQLite(tx) => tx.rollback().await,
        };
        result.map_err(|e| DbError::transaction(format!("Rollback failed: {}", e)))
    }

    pub(crate) fn connection(&mut self) -> DbResult<RoutineConnection<'_>> {
        match self {
            RoutineTransaction::MySql(tx) => Ok(RoutineConnection::MySql(&mut **tx)),
            RoutineTransaction::Postgres(tx) => Ok(RoutineConnection::Postgres(&mut **tx)),
            RoutineTransaction::SQLite(_) => Err(unsupported_engine(DatabaseType::SQLite)),
        }
    }
}

impl std::fmt::Debug for RoutineTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutineTransaction")
            .field("db_type", &self.db_type())
            .finish()
    }
}

pub(crate) fn unsupported_engine(db_type: DatabaseType) -> DbError {
    DbError::invalid_input(format!(
        "{} has no stored routines; use PostgreSQL or MySQL",
        db_type
    ))
}
