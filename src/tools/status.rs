//! Connection status tool.

use crate::db::{BoundStatement, ConnectionManager, QueryExecutor, normalize};
use crate::error::{ToolError, ToolResult};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::warn;

/// Output from the check_connection tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConnectionStatus {
    Connected {
        connected: bool,
        server_version: JsonValue,
        server_name: JsonValue,
        database_name: JsonValue,
    },
    Disconnected {
        connected: bool,
        error: String,
    },
}

pub struct StatusToolHandler {
    connection_manager: Arc<ConnectionManager>,
    executor: QueryExecutor,
}

impl StatusToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>, executor: QueryExecutor) -> Self {
        Self {
            connection_manager,
            executor,
        }
    }

    /// Run the diagnostic query. Every failure, including a failed connect,
    /// is reported as `connected: false`.
    pub async fn check_connection(&self) -> ToolResult<ConnectionStatus> {
        match self.server_info().await {
            Ok(status) => Ok(status),
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Connection check failed");
                Ok(ConnectionStatus::Disconnected {
                    connected: false,
                    error: e.to_string(),
                })
            }
        }
    }

    async fn server_info(&self) -> ToolResult<ConnectionStatus> {
        let pool = self.connection_manager.ensure_connected().await?;
        let sql = pool.db_type().server_info_sql();
        let set = self.executor.fetch(pool, &BoundStatement::raw(sql)).await?;

        let row = set
            .rows
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::query("diagnostic query returned no rows", None))?;
        let mut values = row.into_iter().map(normalize);
        let mut next = || values.next().unwrap_or(JsonValue::Null);

        Ok(ConnectionStatus::Connected {
            connected: true,
            server_version: next(),
            server_name: next(),
            database_name: next(),
        })
    }
}
