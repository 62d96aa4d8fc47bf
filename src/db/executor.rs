//! Statement execution engine.
//!
//! This module runs bound statements against the shared pool with:
//! - Per-statement timeouts
//! - Row-returning vs. row-count outcomes
//! - Multi-statement batches inside one transaction
//! - SQL Server plan capture (`SHOWPLAN_ALL`)
//!
//! # Architecture
//!
//! Engine-specific code lives in submodules:
//! - `mssql`: tiberius over a bb8 pool
//! - `mysql`, `postgres`, `sqlite`: sqlx pools
//!
//! Each submodule exposes the same three functions so the differences between
//! engines stay side by side.

use crate::db::params::BoundStatement;
use crate::db::pool::DbPool;
use crate::db::types::{RowSet, SqlValue, column_names};
use crate::error::{ToolError, ToolResult};
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use sqlx::Either;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// What a single statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// The statement returned a result set (possibly empty).
    Rows(RowSet),
    /// The statement changed rows and returned no result set.
    Affected(u64),
}

/// Runs statements with a fixed per-statement timeout.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    query_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    /// Execute one statement and report its outcome.
    pub async fn run(&self, pool: &DbPool, stmt: &BoundStatement) -> ToolResult<StatementOutcome> {
        let start = Instant::now();
        debug!(
            sql = %stmt.sql,
            params = stmt.params.len(),
            timeout_secs = self.query_timeout.as_secs(),
            "Executing statement"
        );

        let outcome = self
            .with_timeout("statement execution", async {
                match pool {
                    DbPool::Mssql(p) => mssql::run(p, stmt).await,
                    DbPool::MySql(p) => mysql::run(p, stmt).await.map_err(|e| pool.sqlx_error(e)),
                    DbPool::Postgres(p) => {
                        postgres::run(p, stmt).await.map_err(|e| pool.sqlx_error(e))
                    }
                    DbPool::SQLite(p) => sqlite::run(p, stmt).await.map_err(|e| pool.sqlx_error(e)),
                }
            })
            .await?;

        let rows = match &outcome {
            StatementOutcome::Rows(set) => set.len() as u64,
            StatementOutcome::Affected(n) => *n,
        };
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            rows,
            "Statement finished"
        );
        Ok(outcome)
    }

    /// Execute a statement and return its rows; a row-count outcome yields an empty set.
    pub async fn fetch(&self, pool: &DbPool, stmt: &BoundStatement) -> ToolResult<RowSet> {
        match self.run(pool, stmt).await? {
            StatementOutcome::Rows(set) => Ok(set),
            StatementOutcome::Affected(_) => Ok(RowSet::default()),
        }
    }

    /// Execute statements in order inside one transaction; returns total rows affected.
    ///
    /// Any failure rolls the whole batch back.
    pub async fn execute_batch(
        &self,
        pool: &DbPool,
        statements: &[BoundStatement],
    ) -> ToolResult<u64> {
        debug!(statements = statements.len(), "Executing batch in transaction");
        self.with_timeout("batch execution", async {
            match pool {
                DbPool::Mssql(p) => mssql::execute_batch(p, statements).await,
                DbPool::MySql(p) => mysql::execute_batch(p, statements)
                    .await
                    .map_err(|e| pool.sqlx_error(e)),
                DbPool::Postgres(p) => postgres::execute_batch(p, statements)
                    .await
                    .map_err(|e| pool.sqlx_error(e)),
                DbPool::SQLite(p) => sqlite::execute_batch(p, statements)
                    .await
                    .map_err(|e| pool.sqlx_error(e)),
            }
        })
        .await
    }

    /// Capture the estimated plan of `sql` without executing it (SQL Server only).
    ///
    /// Runs on a dedicated connection so the session-level `SHOWPLAN_ALL`
    /// setting never leaks back into the pool.
    pub async fn showplan(&self, pool: &DbPool, sql: &str) -> ToolResult<RowSet> {
        let DbPool::Mssql(p) = pool else {
            return Err(ToolError::query(
                format!("SHOWPLAN is not available for {}", pool.db_type()),
                None,
            ));
        };
        self.with_timeout("plan capture", mssql::showplan(p, sql))
            .await
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = ToolResult<T>>,
    ) -> ToolResult<T> {
        match timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::timeout(operation, self.query_timeout.as_secs())),
        }
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

type ResultStream<'e, DB> = BoxStream<
    'e,
    Result<Either<<DB as sqlx::Database>::QueryResult, <DB as sqlx::Database>::Row>, sqlx::Error>,
>;

/// Drain a sqlx result stream into column names, decoded rows and the merged row count summary.
async fn drain<DB: sqlx::Database>(
    mut stream: ResultStream<'_, DB>,
    decode: fn(&DB::Row) -> Vec<SqlValue>,
) -> Result<(Vec<String>, Vec<Vec<SqlValue>>, DB::QueryResult), sqlx::Error> {
    let mut columns = Vec::new();
    let mut rows = Vec::new();
    let mut summary = DB::QueryResult::default();
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => summary.extend(std::iter::once(done)),
            Either::Right(row) => {
                if rows.is_empty() {
                    columns = column_names(&row);
                }
                rows.push(decode(&row));
            }
        }
    }
    Ok((columns, rows, summary))
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

macro_rules! sqlx_engine {
    ($name:ident, $db:ty, $pool:ty, $bind:path, $decode:path) => {
        mod $name {
            use super::*;
            use sqlx::{Column, Executor};

            pub async fn run(
                pool: &$pool,
                stmt: &BoundStatement,
            ) -> Result<StatementOutcome, sqlx::Error> {
                // Without parameters, run unprepared so statements that refuse
                // preparation (procedures, multi-statement text) still work.
                let stream: ResultStream<'_, $db> = if stmt.params.is_empty() {
                    pool.fetch_many(stmt.sql.as_str())
                } else {
                    let mut query = sqlx::query(&stmt.sql);
                    for param in &stmt.params {
                        query = $bind(query, param);
                    }
                    pool.fetch_many(query)
                };
                let (columns, rows, summary) = drain::<$db>(stream, $decode).await?;
                if !rows.is_empty() {
                    return Ok(StatementOutcome::Rows(RowSet { columns, rows }));
                }

                // No rows came back: the statement's own metadata tells an empty
                // result set apart from a write. Text the driver cannot describe
                // (procedures, several statements) counts as a write.
                let columns: Vec<String> = match pool.describe(&stmt.sql).await {
                    Ok(described) => described
                        .columns()
                        .iter()
                        .map(|c| c.name().to_string())
                        .collect(),
                    Err(e) => {
                        debug!(error = %e, "Statement could not be described");
                        Vec::new()
                    }
                };
                if columns.is_empty() {
                    Ok(StatementOutcome::Affected(summary.rows_affected()))
                } else {
                    Ok(StatementOutcome::Rows(RowSet {
                        columns,
                        rows: Vec::new(),
                    }))
                }
            }

            pub async fn execute_batch(
                pool: &$pool,
                statements: &[BoundStatement],
            ) -> Result<u64, sqlx::Error> {
                let mut tx = pool.begin().await?;
                let mut total = 0;
                for stmt in statements {
                    let mut query = sqlx::query(&stmt.sql);
                    for param in &stmt.params {
                        query = $bind(query, param);
                    }
                    total += query.execute(&mut *tx).await?.rows_affected();
                }
                tx.commit().await?;
                Ok(total)
            }
        }
    };
}

sqlx_engine!(
    mysql,
    sqlx::MySql,
    sqlx::MySqlPool,
    crate::db::params::bind_mysql_param,
    crate::db::types::decode_mysql_row
);
sqlx_engine!(
    postgres,
    sqlx::Postgres,
    sqlx::PgPool,
    crate::db::params::bind_postgres_param,
    crate::db::types::decode_postgres_row
);
sqlx_engine!(
    sqlite,
    sqlx::Sqlite,
    sqlx::SqlitePool,
    crate::db::params::bind_sqlite_param,
    crate::db::types::decode_sqlite_row
);

mod mssql {
    use super::*;
    use crate::db::params::bind_tds_param;
    use crate::db::pool::MssqlPool;
    use crate::db::types::decode_tds_row;
    use tiberius::{Query, QueryStream};

    type Client = bb8_tiberius::rt::Client;

    /// Run one statement; the result metadata decides between rows and a count.
    ///
    /// The session stays marked in flight until every result has been read, so
    /// an interrupted call never hands a half-read stream back to the pool.
    pub async fn run(pool: &MssqlPool, stmt: &BoundStatement) -> ToolResult<StatementOutcome> {
        let mut session = pool.get().await?;
        let client = session.begin();

        let stream = if stmt.params.is_empty() {
            client.simple_query(stmt.sql.as_str()).await?
        } else {
            build_query(stmt).query(&mut *client).await?
        };
        let outcome = match collect(stream).await? {
            Some(set) => StatementOutcome::Rows(set),
            None => StatementOutcome::Affected(last_row_count(client).await?),
        };

        session.finish();
        Ok(outcome)
    }

    /// Run statements inside one transaction.
    ///
    /// `XACT_ABORT` makes the server roll back on any statement error. If the
    /// call is interrupted the session is still in flight, so the pool closes
    /// it and the server rolls the transaction back on disconnect.
    pub async fn execute_batch(pool: &MssqlPool, statements: &[BoundStatement]) -> ToolResult<u64> {
        let mut session = pool.get().await?;
        let client = session.begin();
        client
            .simple_query("SET XACT_ABORT ON; BEGIN TRANSACTION")
            .await?
            .into_results()
            .await?;

        let mut total = 0;
        for stmt in statements {
            match build_query(stmt).execute(&mut *client).await {
                Ok(result) => total += result.total(),
                Err(e) => {
                    let rolled_back = match client.simple_query("IF @@TRANCOUNT > 0 ROLLBACK").await {
                        Ok(stream) => stream.into_results().await.is_ok(),
                        Err(_) => false,
                    };
                    if rolled_back {
                        session.finish();
                    }
                    return Err(e.into());
                }
            }
        }

        client.simple_query("COMMIT").await?.into_results().await?;
        session.finish();
        Ok(total)
    }

    /// Capture the estimated plan on a session outside the pool, so the
    /// `SHOWPLAN_ALL` setting dies with the connection.
    pub async fn showplan(pool: &MssqlPool, sql: &str) -> ToolResult<RowSet> {
        let mut session = pool.dedicated_connection().await?;
        let client = session.begin();
        client
            .simple_query("SET SHOWPLAN_ALL ON")
            .await?
            .into_results()
            .await?;
        let plan = collect(client.simple_query(sql).await?).await?;
        Ok(plan.unwrap_or_default())
    }

    fn build_query(stmt: &BoundStatement) -> Query<'_> {
        let mut query = Query::new(stmt.sql.as_str());
        for param in &stmt.params {
            bind_tds_param(&mut query, param);
        }
        query
    }

    /// Read the first result set, or `None` when the statement produced none.
    ///
    /// Always drains the whole stream.
    async fn collect(mut stream: QueryStream<'_>) -> ToolResult<Option<RowSet>> {
        let columns: Option<Vec<String>> = stream
            .columns()
            .await?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect());

        match columns {
            Some(columns) => {
                let rows = stream.into_first_result().await?;
                Ok(Some(RowSet {
                    columns,
                    rows: rows.into_iter().map(decode_tds_row).collect(),
                }))
            }
            None => {
                stream.into_results().await?;
                Ok(None)
            }
        }
    }

    /// Rows affected by the session's last statement.
    async fn last_row_count(client: &mut Client) -> ToolResult<u64> {
        let row = client
            .simple_query("SELECT CAST(@@ROWCOUNT AS BIGINT)")
            .await?
            .into_row()
            .await?;
        let count = row
            .and_then(|r| r.try_get::<i64, _>(0).ok().flatten())
            .unwrap_or_default();
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
