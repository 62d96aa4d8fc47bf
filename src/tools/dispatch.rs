//! Tool dispatcher.
//!
//! `Dispatcher::dispatch` is the single entry point for tool invocations: it
//! looks the tool up in the routing table, validates the argument map against
//! the catalog, runs the handler under the optional whole-call timeout and
//! renders the outcome as text. Failures come back as `Error: ...` text, never
//! as a panic or a protocol fault.

use crate::db::{ConnectionManager, QueryExecutor};
use crate::error::{ToolError, ToolResult};
use crate::tools::catalog;
use crate::tools::explain::ExplainToolHandler;
use crate::tools::query::QueryToolHandler;
use crate::tools::schema::SchemaToolHandler;
use crate::tools::status::StatusToolHandler;
use crate::tools::write::WriteToolHandler;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Operation behind a tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    ExecuteQuery,
    GetSchema,
    GetTableInfo,
    ExplainQuery,
    CheckConnection,
    GetTableStats,
    SearchTables,
    BackupTable,
    InsertData,
}

/// Routing table; kept in lockstep with `catalog::TOOLS`.
pub const ROUTES: &[(&str, Route)] = &[
    ("execute_query", Route::ExecuteQuery),
    ("get_schema", Route::GetSchema),
    ("get_table_info", Route::GetTableInfo),
    ("explain_query", Route::ExplainQuery),
    ("check_connection", Route::CheckConnection),
    ("get_table_stats", Route::GetTableStats),
    ("search_tables", Route::SearchTables),
    ("backup_table", Route::BackupTable),
    ("insert_data", Route::InsertData),
];

pub fn route(name: &str) -> Option<Route> {
    ROUTES
        .iter()
        .find(|(tool, _)| *tool == name)
        .map(|(_, route)| *route)
}

/// Routes tool calls to their handlers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    connection_manager: Arc<ConnectionManager>,
    executor: QueryExecutor,
    tool_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        executor: QueryExecutor,
        tool_timeout: Option<Duration>,
    ) -> Self {
        Self {
            connection_manager,
            executor,
            tool_timeout,
        }
    }

    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.connection_manager
    }

    /// Run a tool and render its result as text.
    ///
    /// Success is pretty-printed JSON; any escaping error becomes `Error: <message>`.
    pub async fn dispatch(&self, name: &str, arguments: Option<Map<String, JsonValue>>) -> String {
        let start = Instant::now();
        match self.call(name, arguments).await {
            Ok(text) => {
                info!(
                    tool = name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Tool call finished"
                );
                text
            }
            Err(e) => {
                warn!(tool = name, kind = e.kind(), error = %e, "Tool call failed");
                format!("Error: {}", e)
            }
        }
    }

    /// Run a tool, returning its JSON text or the error that escaped it.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<Map<String, JsonValue>>,
    ) -> ToolResult<String> {
        let route = route(name).ok_or_else(|| ToolError::unknown_tool(name))?;
        let descriptor = catalog::find(name).ok_or_else(|| ToolError::unknown_tool(name))?;
        let arguments = descriptor
            .validate(arguments)
            .map_err(|msg| ToolError::validation(name, msg))?;
        debug!(tool = name, ?arguments, "Dispatching tool call");

        let fut = self.invoke(route, name, arguments);
        match self.tool_timeout {
            Some(limit) => timeout(limit, fut)
                .await
                .map_err(|_| ToolError::timeout(name, limit.as_secs()))?,
            None => fut.await,
        }
    }

    async fn invoke(
        &self,
        route: Route,
        name: &str,
        arguments: Map<String, JsonValue>,
    ) -> ToolResult<String> {
        let manager = self.connection_manager.clone();
        let executor = self.executor.clone();
        match route {
            Route::ExecuteQuery => {
                let handler = QueryToolHandler::new(manager, executor);
                render(handler.execute_query(parse(name, arguments)?).await?)
            }
            Route::GetSchema => {
                let handler = SchemaToolHandler::new(manager, executor);
                render(handler.get_schema(parse(name, arguments)?).await?)
            }
            Route::GetTableInfo => {
                let handler = SchemaToolHandler::new(manager, executor);
                render(handler.get_table_info(parse(name, arguments)?).await?)
            }
            Route::ExplainQuery => {
                let handler = ExplainToolHandler::new(manager, executor);
                render(handler.explain(parse(name, arguments)?).await?)
            }
            Route::CheckConnection => {
                let handler = StatusToolHandler::new(manager, executor);
                render(handler.check_connection().await?)
            }
            Route::GetTableStats => {
                let handler = SchemaToolHandler::new(manager, executor);
                render(handler.get_table_stats(parse(name, arguments)?).await?)
            }
            Route::SearchTables => {
                let handler = SchemaToolHandler::new(manager, executor);
                render(handler.search_tables(parse(name, arguments)?).await?)
            }
            Route::BackupTable => {
                let handler = WriteToolHandler::new(manager, executor);
                render(handler.backup_table(parse(name, arguments)?).await?)
            }
            Route::InsertData => {
                let handler = WriteToolHandler::new(manager, executor);
                render(handler.insert_data(parse(name, arguments)?).await?)
            }
        }
    }
}

/// Deserialize a validated argument map into a handler input.
fn parse<T: DeserializeOwned>(tool: &str, arguments: Map<String, JsonValue>) -> ToolResult<T> {
    serde_json::from_value(JsonValue::Object(arguments))
        .map_err(|e| ToolError::validation(tool, e.to_string()))
}

fn render<T: Serialize>(output: T) -> ToolResult<String> {
    serde_json::to_string_pretty(&output)
        .map_err(|e| ToolError::query(format!("failed to encode result: {}", e), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionSettings;
    use crate::tools::catalog::TOOLS;
    use std::collections::BTreeSet;

    fn dispatcher() -> Dispatcher {
        // Never connected: these tests fail before any operation runs.
        let manager = Arc::new(ConnectionManager::new(ConnectionSettings::sqlite(
            "/nonexistent-dir/dispatch.db",
        )));
        Dispatcher::new(manager, QueryExecutor::new(Duration::from_secs(5)), None)
    }

    #[test]
    fn test_routes_match_catalog() {
        let routed: BTreeSet<&str> = ROUTES.iter().map(|(name, _)| *name).collect();
        let listed: BTreeSet<&str> = TOOLS.iter().map(|tool| tool.name).collect();
        assert_eq!(routed, listed);
        assert_eq!(ROUTES.len(), routed.len());
        assert_eq!(TOOLS.len(), listed.len());
    }

    #[test]
    fn test_route_lookup() {
        assert_eq!(route("insert_data"), Some(Route::InsertData));
        assert_eq!(route("INSERT_DATA"), None);
    }

    #[tokio::test]
    async fn test_unknown_tool_names_the_tool() {
        let text = dispatcher().dispatch("drop_database", None).await;
        assert_eq!(text, "Error: Unknown tool: drop_database");
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let text = dispatcher().dispatch("execute_query", None).await;
        assert_eq!(
            text,
            "Error: Invalid arguments for 'execute_query': missing required argument 'query'"
        );
    }

    #[tokio::test]
    async fn test_negative_limit_rejected() {
        let args = serde_json::json!({"query": "SELECT 1", "limit": -5});
        let text = dispatcher()
            .dispatch("execute_query", args.as_object().cloned())
            .await;
        assert!(text.starts_with("Error: Invalid arguments for 'execute_query'"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_rendered() {
        let text = dispatcher().dispatch("get_schema", None).await;
        assert!(text.starts_with("Error: Connection failed"));
    }

    #[tokio::test]
    async fn test_insert_without_rows_skips_connecting() {
        let args = serde_json::json!({"table_name": "t", "data": []});
        let dispatcher = dispatcher();
        let text = dispatcher
            .dispatch("insert_data", args.as_object().cloned())
            .await;
        let value: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(value, serde_json::json!({"error": "No data provided"}));
        assert!(!dispatcher.connection_manager().is_connected());
    }

    #[tokio::test]
    async fn test_check_connection_reports_instead_of_failing() {
        let text = dispatcher().dispatch("check_connection", None).await;
        let value: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(value["connected"], false);
    }
}
