//! Stored routine dispatch.
//!
//! `Dispatcher::dispatch` is the single entry point for running a routine:
//! it binds named parameters, executes on the shared pool (or inside a
//! caller-owned transaction), and shapes the result sets according to the
//! caller's `ExpectedReturn`.

use crate::db::catalog::{self, RoutineSignature};
use crate::db::params::{bind_mysql_param, bind_postgres_param};
use crate::db::pool::{DbPool, PoolProvider};
use crate::db::transaction::{RoutineConnection, RoutineTransaction, unsupported_engine};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{
    DatabaseType, DispatchOutput, ExpectedReturn, NamedResultSets, ResultSet, RoutineParams,
};
use futures_util::TryStreamExt;
use sqlx::{Either, Executor};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error};

type Candidates = Arc<Vec<RoutineSignature>>;

/// Executes stored routines by name.
///
/// Routine signatures are looked up once and cached per routine name. A
/// database error on a routine drops its cached signature so a redefined
/// routine is picked up on the next call.
#[derive(Debug)]
pub struct Dispatcher {
    provider: Arc<PoolProvider>,
    signatures: RwLock<HashMap<String, Candidates>>,
}

impl Dispatcher {
    pub fn new(provider: Arc<PoolProvider>) -> Self {
        Self {
            provider,
            signatures: RwLock::new(HashMap::new()),
        }
    }

    pub fn provider(&self) -> &Arc<PoolProvider> {
        &self.provider
    }

    /// Execute `routine` and shape its output.
    ///
    /// With `transaction`, the routine runs inside it and the caller keeps
    /// ownership of commit and rollback. Without one, a connection is taken
    /// from the shared pool for the duration of the call.
    ///
    /// `result_set_names` only matters for `ExpectedReturn::Multi`.
    ///
    /// # Errors
    ///
    /// Every failure is logged with the routine name and parameters, then
    /// returned unchanged. Nothing is retried.
    pub async fn dispatch<S: AsRef<str>>(
        &self,
        routine: &str,
        params: &RoutineParams,
        expected: ExpectedReturn,
        transaction: Option<&mut RoutineTransaction>,
        result_set_names: Option<&[S]>,
    ) -> DbResult<DispatchOutput> {
        let started = Instant::now();
        match self.run(routine, params, transaction).await {
            Ok(sets) => {
                debug!(
                    routine = %routine,
                    result_sets = sets.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Routine executed"
                );
                Ok(shape_result(sets, expected, result_set_names))
            }
            Err(e) => {
                error!(
                    routine = %routine,
                    parameters = %params_for_log(params),
                    error = %e,
                    "Database request error"
                );
                if matches!(e, DbError::Database { .. }) {
                    self.forget(routine).await;
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        routine: &str,
        params: &RoutineParams,
        transaction: Option<&mut RoutineTransaction>,
    ) -> DbResult<Vec<ResultSet>> {
        catalog::split_routine_name(routine)?;
        catalog::validate_param_names(params)?;

        match transaction {
            Some(tx) => self.call(tx.connection()?, routine, params).await,
            None => {
                let pool = self.provider.acquire().await?;
                match pool.as_ref() {
                    DbPool::Postgres(p) => {
                        let mut conn = p.acquire().await.map_err(|e| pool.acquire_error(e))?;
                        self.call(RoutineConnection::Postgres(&mut *conn), routine, params)
                            .await
                    }
                    DbPool::MySql(p) => {
                        let mut conn = p.acquire().await.map_err(|e| pool.acquire_error(e))?;
                        self.call(RoutineConnection::MySql(&mut *conn), routine, params)
                            .await
                    }
                    DbPool::SQLite(_) => Err(unsupported_engine(DatabaseType::SQLite)),
                }
            }
        }
    }

    async fn call(
        &self,
        conn: RoutineConnection<'_>,
        routine: &str,
        params: &RoutineParams,
    ) -> DbResult<Vec<ResultSet>> {
        let (schema, name) = catalog::split_routine_name(routine)?;

        match conn {
            RoutineConnection::Postgres(conn) => {
                let key = cache_key(DatabaseType::PostgreSQL, routine);
                let candidates = match self.cached(&key).await {
                    Some(candidates) => candidates,
                    None => {
                        let found = catalog::postgres::lookup(&mut *conn, schema, name).await?;
                        self.remember(key, found).await
                    }
                };
                let signature = catalog::postgres::select_overload(&candidates, params)
                    .ok_or_else(|| no_matching_routine(routine, params, &candidates))?;
                let call = catalog::postgres::render(&signature, params)?;
                debug!(routine = %routine, sql = %call.sql, "Calling routine");

                let mut query = sqlx::query(&call.sql);
                for value in call.values {
                    query = bind_postgres_param(query, value);
                }
                let items: Vec<_> = conn.fetch_many(query).try_collect().await?;
                Ok(split_result_sets(items))
            }
            RoutineConnection::MySql(conn) => {
                let key = cache_key(DatabaseType::MySQL, routine);
                let candidates = match self.cached(&key).await {
                    Some(candidates) => candidates,
                    None => {
                        let found = catalog::mysql::lookup(&mut *conn, schema, name).await?;
                        self.remember(key, found.into_iter().collect()).await
                    }
                };
                let signature = candidates
                    .first()
                    .ok_or_else(|| no_matching_routine(routine, params, &candidates))?;
                let call = catalog::mysql::render(signature, params)?;
                debug!(routine = %routine, sql = %call.sql, "Calling routine");

                for (statement, value) in &call.setup {
                    bind_mysql_param(sqlx::query(statement), value)
                        .execute(&mut *conn)
                        .await?;
                }
                let mut query = sqlx::query(&call.sql);
                for value in call.values {
                    query = bind_mysql_param(query, value);
                }
                let items: Vec<_> = conn.fetch_many(query).try_collect().await?;
                let mut sets = split_result_sets(items);
                // CALL always ends with a status result that carries no rows.
                if sets.last().is_some_and(Vec::is_empty) {
                    sets.pop();
                }
                Ok(sets)
            }
        }
    }

    async fn cached(&self, key: &str) -> Option<Candidates> {
        self.signatures.read().await.get(key).cloned()
    }

    async fn remember(&self, key: String, found: Vec<RoutineSignature>) -> Candidates {
        let candidates = Arc::new(found);
        if !candidates.is_empty() {
            self.signatures
                .write()
                .await
                .insert(key, Arc::clone(&candidates));
        }
        candidates
    }

    async fn forget(&self, routine: &str) {
        let mut signatures = self.signatures.write().await;
        for db_type in [DatabaseType::PostgreSQL, DatabaseType::MySQL] {
            signatures.remove(&cache_key(db_type, routine));
        }
    }
}

fn cache_key(db_type: DatabaseType, routine: &str) -> String {
    format!("{}:{}", db_type, routine.to_ascii_lowercase())
}

fn no_matching_routine(
    routine: &str,
    params: &RoutineParams,
    candidates: &[RoutineSignature],
) -> DbError {
    if candidates.is_empty() {
        return DbError::database(
            format!("Routine '{}' does not exist", routine),
            Some("42883".to_string()),
            "Check the routine name and that the database user can execute it",
        );
    }
    let supplied: Vec<&str> = params.names().collect();
    DbError::invalid_input(format!(
        "No overload of '{}' accepts parameters [{}]",
        routine,
        supplied.join(", ")
    ))
}

fn params_for_log(params: &RoutineParams) -> String {
    serde_json::to_string(params).unwrap_or_else(|_| format!("{:?}", params))
}

/// Group a driver stream into result sets.
///
/// Every statement result (`Either::Left`) closes the set being collected,
/// so a statement that returned no rows still yields an empty set.
pub(crate) fn split_result_sets<Q, R: RowToJson>(items: Vec<Either<Q, R>>) -> Vec<ResultSet> {
    let mut sets = Vec::new();
    let mut current = Vec::new();
    for item in items {
        match item {
            Either::Left(_) => sets.push(std::mem::take(&mut current)),
            Either::Right(row) => current.push(row.to_json_map()),
        }
    }
    if !current.is_empty() {
        sets.push(current);
    }
    sets
}

/// Shape raw result sets for the caller.
///
/// - `Single`: first row of the first set, or `None` when there is none.
/// - `Multi` with names: each name maps to the set at the same position,
///   or to an empty set when the routine produced fewer sets than names.
///   Later duplicates of a name win.
/// - `Multi` without names (or with an empty list): all sets in order.
/// - `None`: output is discarded.
pub fn shape_result<S: AsRef<str>>(
    sets: Vec<ResultSet>,
    expected: ExpectedReturn,
    result_set_names: Option<&[S]>,
) -> DispatchOutput {
    match expected {
        ExpectedReturn::Single => {
            DispatchOutput::Row(sets.into_iter().next().and_then(|set| set.into_iter().next()))
        }
        ExpectedReturn::Multi => match result_set_names {
            Some(names) if !names.is_empty() => {
                let mut sets = sets.into_iter();
                let mut named = NamedResultSets::new();
                for name in names {
                    named.insert(name.as_ref(), sets.next().unwrap_or_default());
                }
                DispatchOutput::Named(named)
            }
            _ => DispatchOutput::ResultSets(sets),
        },
        ExpectedReturn::None => DispatchOutput::Nothing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Row;
    use serde_json::json;

    const NO_NAMES: Option<&[&str]> = None;

    fn row(value: serde_json::Value) -> Row {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    struct FakeRow(Row);

    impl RowToJson for FakeRow {
        fn to_json_map(&self) -> Row {
            self.0.clone()
        }
    }

    #[test]
    fn test_single_returns_first_row_of_first_set() {
        let sets = vec![
            vec![row(json!({"idBank": 7})), row(json!({"idBank": 8}))],
            vec![row(json!({"other": true}))],
        ];
        let output = shape_result(sets, ExpectedReturn::Single, NO_NAMES);
        assert_eq!(output.into_row(), Some(row(json!({"idBank": 7}))));
    }

    #[test]
    fn test_single_with_no_rows_is_none() {
        let output = shape_result(vec![vec![]], ExpectedReturn::Single, NO_NAMES);
        assert_eq!(output, DispatchOutput::Row(None));

        let output = shape_result(vec![], ExpectedReturn::Single, NO_NAMES);
        assert_eq!(output, DispatchOutput::Row(None));
    }

    #[test]
    fn test_multi_with_names_pads_missing_sets() {
        let sets = vec![
            vec![row(json!({"idBank": 1}))],
            vec![row(json!({"idAgency": 10})), row(json!({"idAgency": 11}))],
        ];
        let names = ["banks", "agencies", "accounts"];
        let named = shape_result(sets, ExpectedReturn::Multi, Some(&names[..]))
            .into_named()
            .unwrap();

        assert_eq!(named.names().collect::<Vec<_>>(), names);
        assert_eq!(named.get("banks").unwrap().len(), 1);
        assert_eq!(named.get("agencies").unwrap().len(), 2);
        assert!(named.get("accounts").unwrap().is_empty());
    }

    #[test]
    fn test_multi_without_names_returns_all_sets() {
        let sets = vec![vec![row(json!({"a": 1}))], vec![], vec![row(json!({"b": 2}))]];
        let output = shape_result(sets.clone(), ExpectedReturn::Multi, NO_NAMES);
        assert_eq!(output.into_result_sets(), Some(sets.clone()));

        let empty: [&str; 0] = [];
        let output = shape_result(sets.clone(), ExpectedReturn::Multi, Some(&empty[..]));
        assert_eq!(output.into_result_sets(), Some(sets));
    }

    #[test]
    fn test_multi_duplicate_name_keeps_later_set() {
        let sets = vec![vec![row(json!({"n": 1}))], vec![row(json!({"n": 2}))]];
        let names = ["x", "x"];
        let named = shape_result(sets, ExpectedReturn::Multi, Some(&names[..]))
            .into_named()
            .unwrap();
        assert_eq!(named.len(), 1);
        assert_eq!(named.get("x").unwrap()[0], row(json!({"n": 2})));
    }

    #[test]
    fn test_none_discards_output() {
        let sets = vec![vec![row(json!({"ignored": true}))]];
        assert!(shape_result(sets, ExpectedReturn::None, NO_NAMES).is_nothing());
    }

    #[test]
    fn test_split_result_sets_keeps_empty_sets() {
        let items: Vec<Either<(), FakeRow>> = vec![
            Either::Right(FakeRow(row(json!({"a": 1})))),
            Either::Left(()),
            Either::Left(()),
            Either::Right(FakeRow(row(json!({"b": 2})))),
            Either::Right(FakeRow(row(json!({"b": 3})))),
            Either::Left(()),
        ];
        let sets = split_result_sets(items);
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].len(), 1);
        assert!(sets[1].is_empty());
        assert_eq!(sets[2].len(), 2);
    }

    #[test]
    fn test_split_result_sets_without_trailing_marker() {
        let items: Vec<Either<(), FakeRow>> = vec![Either::Right(FakeRow(row(json!({"a": 1}))))];
        assert_eq!(split_result_sets(items).len(), 1);
    }

    #[test]
    fn test_cache_key_is_case_insensitive() {
        assert_eq!(
            cache_key(DatabaseType::PostgreSQL, "spBankGet"),
            cache_key(DatabaseType::PostgreSQL, "SPBANKGET")
        );
        assert_ne!(
            cache_key(DatabaseType::PostgreSQL, "spBankGet"),
            cache_key(DatabaseType::MySQL, "spBankGet")
        );
    }

    #[test]
    fn test_no_matching_routine_errors() {
        let params = RoutineParams::new().with("idBank", 1);
        let err = no_matching_routine("spMissing", &params, &[]);
        assert!(matches!(err, DbError::Database { sql_state: Some(ref s), .. } if s == "42883"));

        let sig = RoutineSignature {
            schema: "public".to_string(),
            name: "spbankget".to_string(),
            kind: catalog::RoutineKind::Function,
            parameters: vec![],
            search_rank: 1,
        };
        let err = no_matching_routine("spBankGet", &params, &[sig]);
        assert!(matches!(err, DbError::InvalidInput { .. }));
        assert!(err.to_string().contains("idBank"));
    }

    #[tokio::test]
    async fn test_sqlite_dispatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.db");
        let config = crate::models::ConnectionConfig::sqlite(
            path.to_string_lossy(),
            crate::config::PoolOptions::default(),
        )
        .unwrap();
        let dispatcher = Dispatcher::new(Arc::new(PoolProvider::new(config)));

        let err = dispatcher
            .dispatch(
                "spBankList",
                &RoutineParams::new(),
                ExpectedReturn::Multi,
                None,
                NO_NAMES,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_empty_routine_name_is_rejected_before_connecting() {
        let config = crate::models::ConnectionConfig::new(
            DatabaseType::PostgreSQL,
            "127.0.0.1",
            Some(1),
            "gateway",
            "postgres",
            "",
            crate::config::PoolOptions::default(),
        )
        .unwrap();
        let provider = Arc::new(PoolProvider::new(config));
        let dispatcher = Dispatcher::new(Arc::clone(&provider));

        let err = dispatcher
            .dispatch("", &RoutineParams::new(), ExpectedReturn::None, None, NO_NAMES)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
        assert!(!provider.is_initialized().await);
    }
}
