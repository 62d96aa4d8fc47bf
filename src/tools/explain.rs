//! Explain tool implementation.
//!
//! SQL Server plans come from `SET SHOWPLAN_ALL ON`, which compiles the
//! statement without running it, so write statements are never applied.
//! The other engines prefix the statement with their EXPLAIN form.

use crate::db::{BoundStatement, ConnectionManager, DbPool, QueryExecutor, RowSet};
use crate::error::ToolResult;
use crate::tools::{ErrorOutput, inline_failure};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::debug;

/// Input for the explain_query tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExplainInput {
    pub query: String,
}

/// Output from the explain_query tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExplainOutput {
    Plan {
        query: String,
        execution_plan: Vec<Map<String, JsonValue>>,
    },
    Error(ErrorOutput),
}

pub struct ExplainToolHandler {
    connection_manager: Arc<ConnectionManager>,
    executor: QueryExecutor,
}

impl ExplainToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>, executor: QueryExecutor) -> Self {
        Self {
            connection_manager,
            executor,
        }
    }

    pub async fn explain(&self, input: ExplainInput) -> ToolResult<ExplainOutput> {
        let pool = self.connection_manager.ensure_connected().await?;
        let result = self.plan(pool, &input.query).await.map(|plan| {
            debug!(steps = plan.len(), "Captured execution plan");
            ExplainOutput::Plan {
                query: input.query.clone(),
                execution_plan: plan.into_mappings(),
            }
        });
        inline_failure("explain_query", result, |e| {
            ExplainOutput::Error(ErrorOutput::new(e))
        })
    }

    async fn plan(&self, pool: &DbPool, query: &str) -> ToolResult<RowSet> {
        match pool.db_type().explain_prefix() {
            Some(prefix) => {
                let stmt = BoundStatement::raw(format!("{}{}", prefix, query));
                self.executor.fetch(pool, &stmt).await
            }
            None => self.executor.showplan(pool, query).await,
        }
    }
}
