//! Query tool implementation.
//!
//! This module implements the `execute_query` tool: an arbitrary statement with
//! named parameters, row-capped when it is a plain read.

use crate::db::{BoundStatement, ConnectionManager, QueryExecutor, StatementOutcome, bind_named};
use crate::error::{ToolError, ToolResult};
use crate::tools::inline_failure;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_LIMIT: u32 = 1000;

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

/// Input for the execute_query tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryInput {
    /// SQL statement; `:name` placeholders are filled from `params`.
    pub query: String,
    #[serde(default)]
    pub params: Map<String, JsonValue>,
    /// Row cap injected into plain reads; 0 disables it.
    #[serde(default = "default_limit")]
    pub limit: u32,
}

/// Output from the execute_query tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Rows {
        success: bool,
        row_count: usize,
        columns: Vec<String>,
        data: Vec<Map<String, JsonValue>>,
        query: String,
    },
    Affected {
        success: bool,
        message: String,
        query: String,
    },
    Failed {
        success: bool,
        error: String,
        query: String,
    },
}

pub struct QueryToolHandler {
    connection_manager: Arc<ConnectionManager>,
    executor: QueryExecutor,
}

impl QueryToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>, executor: QueryExecutor) -> Self {
        Self {
            connection_manager,
            executor,
        }
    }

    pub async fn execute_query(&self, input: QueryInput) -> ToolResult<QueryOutput> {
        let pool = self.connection_manager.ensure_connected().await?;
        let db_type = pool.db_type();

        let query = db_type.apply_row_limit(&input.query, input.limit);
        let stmt: BoundStatement = bind_named(&query, db_type, &input.params)
            .map_err(|msg| ToolError::validation("execute_query", msg))?;

        let result = self.executor.run(pool, &stmt).await.map(|outcome| match outcome {
            StatementOutcome::Rows(set) => {
                let columns = set.columns.clone();
                let data = set.into_mappings();
                info!(rows = data.len(), "Query returned rows");
                QueryOutput::Rows {
                    success: true,
                    row_count: data.len(),
                    columns,
                    data,
                    query: query.clone(),
                }
            }
            StatementOutcome::Affected(n) => {
                info!(rows_affected = n, "Statement executed");
                QueryOutput::Affected {
                    success: true,
                    message: format!("Query executed successfully. Rows affected: {}", n),
                    query: query.clone(),
                }
            }
        });

        inline_failure("execute_query", result, |error| QueryOutput::Failed {
            success: false,
            error,
            query: query.clone(),
        })
    }
}
