//! Stored-procedure execution engine.
//!
//! The executor's one job is shape negotiation: it binds a parameter
//! mapping to a named routine, runs it against the shared pool or a caller
//! supplied transaction, and folds the driver's result tables into the
//! shape the caller declared. It never models domain entities, never
//! decides transaction outcomes, and never retries.

use crate::db::params::{ParamMap, bind_mysql_param, bind_pg_param};
use crate::db::pool::{self, DbPool};
use crate::db::transaction::{DbTransaction, ProcTransaction};
use crate::db::types::{RecordSet, RowToJson};
use crate::error::{ApiError, ApiResult};
use futures_util::TryStreamExt;
use serde_json::Value as JsonValue;
use sqlx::{Either, MySql, Postgres};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Default per-call execution timeout in seconds.
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 30;

/// How the caller expects a routine's output to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// No data expected; result tables are never fetched.
    None,
    /// Exactly one result table, returned directly.
    Single,
    /// Zero or more result tables, ordered or named.
    Multi,
}

/// A shape-normalized routine result.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcOutcome {
    None,
    /// The primary result table.
    Single(RecordSet),
    /// All result tables in source order.
    Sets(Vec<RecordSet>),
    /// Result tables keyed by caller-declared names, in declaration order.
    Named(Vec<(String, RecordSet)>),
}

impl ProcOutcome {
    /// Render the outcome as the JSON value the response envelope carries.
    pub fn into_json(self) -> JsonValue {
        match self {
            Self::None => JsonValue::Null,
            Self::Single(set) => set_json(set),
            Self::Sets(sets) => JsonValue::Array(sets.into_iter().map(set_json).collect()),
            Self::Named(pairs) => {
                let mut map = serde_json::Map::new();
                for (name, set) in pairs {
                    map.insert(name, set_json(set));
                }
                JsonValue::Object(map)
            }
        }
    }
}

fn set_json(set: RecordSet) -> JsonValue {
    JsonValue::Array(set.into_iter().map(JsonValue::Object).collect())
}

/// Executes named routines with bound parameters.
pub struct ProcExecutor {
    execution_timeout: Duration,
}

impl ProcExecutor {
    /// Create an executor with the default timeout.
    pub fn new() -> Self {
        Self {
            execution_timeout: Duration::from_secs(DEFAULT_EXECUTION_TIMEOUT_SECS),
        }
    }

    /// Create an executor with a custom per-call timeout.
    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            execution_timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Execute a named routine.
    ///
    /// Parameters are bound in mapping order, each exactly once. When
    /// `transaction` is supplied the call runs on that transaction's
    /// connection; it never falls back to the pool. `result_set_names` is
    /// only meaningful with [`ResultShape::Multi`] and must correspond
    /// positionally to the returned tables.
    pub async fn execute(
        &self,
        routine: &str,
        params: &ParamMap,
        shape: ResultShape,
        transaction: Option<&mut ProcTransaction>,
        result_set_names: Option<&[&str]>,
    ) -> ApiResult<ProcOutcome> {
        validate_routine_name(routine)?;
        if result_set_names.is_some() && shape != ResultShape::Multi {
            return Err(ApiError::invalid_input(
                "Result set names are only meaningful with ResultShape::Multi",
            ));
        }

        debug!(
            routine = %routine,
            params = params.len(),
            shape = ?shape,
            in_transaction = transaction.is_some(),
            "Executing routine"
        );

        let sets = match transaction {
            Some(tx) => match tx.active()? {
                DbTransaction::Postgres(tx) => {
                    self.bounded(routine, pg_recordsets(&mut **tx, routine, params, shape))
                        .await?
                }
                DbTransaction::MySql(tx) => {
                    self.bounded(routine, mysql_recordsets(&mut **tx, routine, params, shape))
                        .await?
                }
            },
            None => match pool::acquire().await? {
                DbPool::Postgres(pool) => {
                    self.bounded(routine, pg_recordsets(&pool, routine, params, shape))
                        .await?
                }
                DbPool::MySql(pool) => {
                    self.bounded(routine, mysql_recordsets(&pool, routine, params, shape))
                        .await?
                }
            },
        };

        shape_outcome(shape, sets, result_set_names)
    }

    /// Bound one execution attempt by the configured timeout.
    async fn bounded<F>(&self, routine: &str, fut: F) -> ApiResult<Vec<RecordSet>>
    where
        F: Future<Output = ApiResult<Vec<RecordSet>>>,
    {
        match timeout(self.execution_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::execution(
                format!(
                    "Execution of '{}' exceeded {}s",
                    routine,
                    self.execution_timeout.as_secs()
                ),
                None,
            )),
        }
    }
}

impl Default for ProcExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a routine name: non-empty, dot-separated identifier segments.
/// The name is interpolated into the invocation statement, so anything that
/// is not a plain (optionally schema-qualified) identifier is rejected
/// before the database is touched.
fn validate_routine_name(name: &str) -> ApiResult<()> {
    let valid = !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        });

    if valid {
        Ok(())
    } else {
        Err(ApiError::invalid_input(format!(
            "Invalid routine name: '{name}'"
        )))
    }
}

/// Quote a validated, possibly schema-qualified routine name.
fn quote_qualified(name: &str, quote: char) -> String {
    name.split('.')
        .map(|segment| format!("{quote}{segment}{quote}"))
        .collect::<Vec<_>>()
        .join(".")
}

/// Invocation statement for PostgreSQL. Routines that produce result tables
/// are set-returning functions; `CALL` covers the data-free case.
fn pg_invocation(routine: &str, argc: usize, shape: ResultShape) -> String {
    let placeholders = (1..=argc)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let name = quote_qualified(routine, '"');
    match shape {
        ResultShape::None => format!("CALL {name}({placeholders})"),
        _ => format!("SELECT * FROM {name}({placeholders})"),
    }
}

/// Invocation statement for MySQL.
fn mysql_invocation(routine: &str, argc: usize) -> String {
    let placeholders = vec!["?"; argc].join(", ");
    let name = quote_qualified(routine, '`');
    format!("CALL {name}({placeholders})")
}

/// Run a routine on a PostgreSQL connection and collect its result tables.
async fn pg_recordsets<'c, E>(
    executor: E,
    routine: &str,
    params: &ParamMap,
    shape: ResultShape,
) -> ApiResult<Vec<RecordSet>>
where
    E: sqlx::Executor<'c, Database = Postgres>,
{
    let sql = pg_invocation(routine, params.len(), shape);
    let mut query = sqlx::query(&sql);
    for (_, param) in params.iter() {
        query = bind_pg_param(query, param);
    }

    if shape == ResultShape::None {
        query.execute(executor).await?;
        return Ok(Vec::new());
    }

    let mut stream = query.fetch_many(executor);
    let mut sets: Vec<RecordSet> = Vec::new();
    let mut current = RecordSet::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(_done) => sets.push(std::mem::take(&mut current)),
            Either::Right(row) => current.push(row.to_json_map()),
        }
    }
    if !current.is_empty() {
        sets.push(current);
    }
    Ok(sets)
}

/// Run a routine on a MySQL connection and collect its result tables.
async fn mysql_recordsets<'c, E>(
    executor: E,
    routine: &str,
    params: &ParamMap,
    shape: ResultShape,
) -> ApiResult<Vec<RecordSet>>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    let sql = mysql_invocation(routine, params.len());
    let mut query = sqlx::query(&sql);
    for (_, param) in params.iter() {
        query = bind_mysql_param(query, param);
    }

    if shape == ResultShape::None {
        query.execute(executor).await?;
        return Ok(Vec::new());
    }

    let mut stream = query.fetch_many(executor);
    let mut sets: Vec<RecordSet> = Vec::new();
    let mut current = RecordSet::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(_done) => sets.push(std::mem::take(&mut current)),
            Either::Right(row) => current.push(row.to_json_map()),
        }
    }
    if !current.is_empty() {
        sets.push(current);
    }
    // The CALL statement's own completion closes one final empty batch that
    // is not a result table.
    if sets.last().is_some_and(|s| s.is_empty()) {
        sets.pop();
    }
    Ok(sets)
}

/// Fold collected result tables into the requested shape.
fn shape_outcome(
    shape: ResultShape,
    sets: Vec<RecordSet>,
    names: Option<&[&str]>,
) -> ApiResult<ProcOutcome> {
    match shape {
        ResultShape::None => Ok(ProcOutcome::None),
        ResultShape::Single => sets
            .into_iter()
            .next()
            .map(ProcOutcome::Single)
            .ok_or_else(|| ApiError::shape_mismatch("Routine produced no result table")),
        ResultShape::Multi => match names {
            None => Ok(ProcOutcome::Sets(sets)),
            Some(names) => {
                if names.len() != sets.len() {
                    return Err(ApiError::shape_mismatch(format!(
                        "{} result set names supplied for {} result tables",
                        names.len(),
                        sets.len()
                    )));
                }
                Ok(ProcOutcome::Named(
                    names.iter().map(|n| (*n).to_string()).zip(sets).collect(),
                ))
            }
        },
    }
}
