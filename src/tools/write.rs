//! Write operation tools.
//!
//! This module implements the `backup_table` and `insert_data` MCP tools.
//! Both run their statements through `QueryExecutor::execute_batch`, so each
//! call commits once or not at all.

use crate::db::{
    BoundStatement, ConnectionManager, DatabaseType, DbPool, InferredType, QueryExecutor,
    bind_named,
};
use crate::error::{ToolError, ToolResult};
use crate::tools::{ErrorOutput, inline_failure};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::info;

/// Input for the backup_table tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupInput {
    pub table_name: String,
    /// Generated as `<table>_backup_<YYYYmmddHHMMSS>` when absent or empty.
    #[serde(default)]
    pub backup_name: Option<String>,
}

/// Output from the backup_table tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BackupOutput {
    Done {
        success: bool,
        original_table: String,
        backup_table: String,
        rows_copied: i64,
    },
    Error(ErrorOutput),
}

/// How `insert_data` treats an existing target table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    /// Append to the table, creating it first if needed.
    #[default]
    Ignore,
    /// Drop the table and recreate it from the supplied rows.
    Replace,
}

/// Input for the insert_data tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertInput {
    pub table_name: String,
    pub data: Vec<Map<String, JsonValue>>,
    #[serde(default)]
    pub on_conflict: ConflictMode,
}

/// Output from the insert_data tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InsertOutput {
    Done {
        success: bool,
        table_name: String,
        /// Number of rows supplied, not a count read back from the database.
        rows_inserted: usize,
        conflict_handling: ConflictMode,
    },
    Error(ErrorOutput),
}

pub struct WriteToolHandler {
    connection_manager: Arc<ConnectionManager>,
    executor: QueryExecutor,
}

impl WriteToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>, executor: QueryExecutor) -> Self {
        Self {
            connection_manager,
            executor,
        }
    }

    pub async fn backup_table(&self, input: BackupInput) -> ToolResult<BackupOutput> {
        let pool = self.connection_manager.ensure_connected().await?;
        let backup_name = match input.backup_name.filter(|name| !name.is_empty()) {
            Some(name) => name,
            None => default_backup_name(&input.table_name),
        };

        let result = self
            .copy_table(pool, &input.table_name, &backup_name)
            .await
            .map_err(|e| e.in_operation("backup_table", Some(&input.table_name)));
        let result = result.map(|rows_copied| {
            info!(
                table = %input.table_name,
                backup = %backup_name,
                rows_copied,
                "Table backed up"
            );
            BackupOutput::Done {
                success: true,
                original_table: input.table_name.clone(),
                backup_table: backup_name.clone(),
                rows_copied,
            }
        });
        inline_failure("backup_table", result, |e| {
            BackupOutput::Error(ErrorOutput::new(e))
        })
    }

    async fn copy_table(&self, pool: &DbPool, source: &str, target: &str) -> ToolResult<i64> {
        let db_type = pool.db_type();
        self.executor
            .execute_batch(pool, &[BoundStatement::raw(db_type.copy_table_sql(source, target))])
            .await?;
        let count = self
            .executor
            .fetch(pool, &BoundStatement::raw(db_type.count_rows_sql(target)))
            .await?;
        count.row_count()
    }

    pub async fn insert_data(&self, input: InsertInput) -> ToolResult<InsertOutput> {
        if input.data.is_empty() {
            return Ok(InsertOutput::Error(ErrorOutput::new("No data provided")));
        }
        let pool = self.connection_manager.ensure_connected().await?;
        let db_type = pool.db_type();

        let statements = insert_plan(db_type, &input.table_name, &input.data, input.on_conflict)
            .map_err(|e| ToolError::validation("insert_data", e))?;
        let result = self
            .executor
            .execute_batch(pool, &statements)
            .await
            .map_err(|e| e.in_operation("insert_data", Some(&input.table_name)))
            .map(|_| {
                info!(
                    table = %input.table_name,
                    rows = input.data.len(),
                    mode = ?input.on_conflict,
                    "Rows inserted"
                );
                InsertOutput::Done {
                    success: true,
                    table_name: input.table_name.clone(),
                    rows_inserted: input.data.len(),
                    conflict_handling: input.on_conflict,
                }
            });
        inline_failure("insert_data", result, |e| {
            InsertOutput::Error(ErrorOutput::new(e))
        })
    }
}

/// `<table>_backup_<YYYYmmddHHMMSS>` in local time.
pub fn default_backup_name(table: &str) -> String {
    format!("{}_backup_{}", table, Local::now().format("%Y%m%d%H%M%S"))
}

/// Union of row keys in first-seen order, each with its widened type.
///
/// A column that is null in every row is created as text.
pub fn infer_columns(rows: &[Map<String, JsonValue>]) -> Vec<(String, InferredType)> {
    let mut columns: Vec<(String, Option<InferredType>)> = Vec::new();
    for row in rows {
        for (key, value) in row {
            let observed = InferredType::of(value);
            match columns.iter_mut().find(|(name, _)| name == key) {
                Some((_, kind)) => {
                    *kind = match (*kind, observed) {
                        (Some(a), Some(b)) => Some(a.merge(b)),
                        (a, b) => a.or(b),
                    };
                }
                None => columns.push((key.clone(), observed)),
            }
        }
    }
    columns
        .into_iter()
        .map(|(name, kind)| (name, kind.unwrap_or(InferredType::Text)))
        .collect()
}

/// Statements that create (or recreate) the table and insert every row.
pub fn insert_plan(
    db_type: DatabaseType,
    table: &str,
    rows: &[Map<String, JsonValue>],
    mode: ConflictMode,
) -> Result<Vec<BoundStatement>, String> {
    let columns = infer_columns(rows);
    let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();

    let mut statements = Vec::with_capacity(rows.len() + 2);
    if mode == ConflictMode::Replace {
        statements.push(BoundStatement::raw(db_type.drop_table_if_exists_sql(table)));
    }
    statements.push(BoundStatement::raw(db_type.create_table_sql(table, &columns)));

    let insert_sql = db_type.insert_row_sql(table, &names);
    for row in rows {
        let values: Map<String, JsonValue> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = match row.get(name) {
                    Some(nested @ (JsonValue::Array(_) | JsonValue::Object(_))) => {
                        JsonValue::String(nested.to_string())
                    }
                    Some(v) => v.clone(),
                    None => JsonValue::Null,
                };
                (format!("c{}", i), value)
            })
            .collect();
        statements.push(bind_named(&insert_sql, db_type, &values)?);
    }
    Ok(statements)
}
