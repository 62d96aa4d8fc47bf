//! MCP service implementation using rmcp.
//!
//! `SqlServerService` implements `ServerHandler` by hand: discovery returns the
//! static tool catalog and every call goes through the `Dispatcher`, whose text
//! result is returned as a single text content item.

use crate::db::{ConnectionManager, QueryExecutor};
use crate::tools::Dispatcher;
use crate::tools::catalog::{TOOLS, ToolDescriptor};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const INSTRUCTIONS: &str = "SQL Server database tools.\n\
\n\
## Workflow\n\
1. Call `check_connection` to confirm the server is reachable\n\
2. Use `get_schema` or `search_tables` to find tables and columns\n\
3. Use `execute_query` for reads and writes; named parameters use `:name`\n\
\n\
## Results\n\
- Every tool returns JSON text. Statement failures are reported inside the\n\
  JSON (`error` field); a text result starting with `Error: ` means the call\n\
  itself was rejected (unknown tool, invalid arguments, no connection).\n\
- `execute_query` caps plain SELECT statements at `limit` rows (default 1000).\n\
- `explain_query` returns the estimated plan; the statement is not executed.\n\
- `insert_data` with `on_conflict: replace` drops and recreates the table.";

#[derive(Debug, Clone)]
pub struct SqlServerService {
    dispatcher: Arc<Dispatcher>,
}

impl SqlServerService {
    /// Create a new service.
    ///
    /// # Arguments
    ///
    /// * `connection_manager` - Shared connection manager for database operations
    /// * `query_timeout` - Limit for each statement
    /// * `tool_timeout` - Optional limit for a whole tool call
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        query_timeout: Duration,
        tool_timeout: Option<Duration>,
    ) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(
                connection_manager,
                QueryExecutor::new(query_timeout),
                tool_timeout,
            )),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The catalog as protocol tool definitions, in catalog order.
    pub fn tools() -> Vec<Tool> {
        TOOLS.iter().map(to_tool).collect()
    }
}

fn to_tool(descriptor: &ToolDescriptor) -> Tool {
    Tool::new(
        descriptor.name,
        descriptor.description,
        Arc::new(descriptor.input_schema()),
    )
}

impl ServerHandler for SqlServerService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_owned(),
                title: Some("SQL Server MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                ..Implementation::from_build_env()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(Self::tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        debug!(tool = %request.name, "Received tool call");
        let text = self
            .dispatcher
            .dispatch(request.name.as_ref(), request.arguments)
            .await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionSettings;

    fn create_test_service() -> SqlServerService {
        let manager = Arc::new(ConnectionManager::new(ConnectionSettings::sqlite(
            ":memory:",
        )));
        SqlServerService::new(manager, Duration::from_secs(5), None)
    }

    #[test]
    fn test_server_info() {
        let info = create_test_service().get_info();
        assert_eq!(info.server_info.name, "sql-server-mcp");
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("execute_query"));
    }

    #[test]
    fn test_tools_follow_catalog() {
        let tools = SqlServerService::tools();
        assert_eq!(tools.len(), 9);
        assert_eq!(tools[0].name, "execute_query");
        assert_eq!(
            tools[0].description.as_deref(),
            Some("Execute a SQL query against the SQL Server database")
        );
        assert_eq!(tools[0].input_schema["required"], serde_json::json!(["query"]));
    }

    #[tokio::test]
    async fn test_dispatcher_is_shared() {
        let service = create_test_service();
        let clone = service.clone();
        assert!(std::ptr::eq(service.dispatcher(), clone.dispatcher()));
        let text = clone.dispatcher().dispatch("nope", None).await;
        assert_eq!(text, "Error: Unknown tool: nope");
    }
}
