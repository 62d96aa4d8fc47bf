//! MCP tool implementations.
//!
//! This module contains the tool catalog, the dispatcher and the handlers
//! behind each tool:
//! - `query`: `execute_query`
//! - `schema`: `get_schema`, `get_table_info`, `get_table_stats`, `search_tables`
//! - `explain`: `explain_query`
//! - `status`: `check_connection`
//! - `write`: `backup_table`, `insert_data`
//!
//! Handlers fold statement failures into their own result maps. Connection,
//! validation and dispatch failures propagate to the dispatcher.

pub mod catalog;
pub mod dispatch;
pub mod explain;
pub mod query;
pub mod schema;
pub mod status;
pub mod write;

pub use catalog::{TOOLS, ToolDescriptor};
pub use dispatch::Dispatcher;

use crate::error::{ToolError, ToolResult};
use serde::Serialize;
use tracing::warn;

/// Inline failure result: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorOutput {
    pub error: String,
}

impl ErrorOutput {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Turn statement-level failures into an inline result built by `on_failure`.
///
/// Query errors and statement timeouts are folded; every other kind is
/// returned unchanged so the dispatcher can render it.
pub(crate) fn inline_failure<T>(
    tool: &str,
    result: ToolResult<T>,
    on_failure: impl FnOnce(String) -> T,
) -> ToolResult<T> {
    match result {
        Err(err @ (ToolError::Query { .. } | ToolError::Timeout { .. })) => {
            let (operation, table) = err.context();
            warn!(
                tool,
                kind = err.kind(),
                operation,
                table,
                error = %err,
                "Tool statement failed"
            );
            Ok(on_failure(err.to_string()))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_failure_folds_query_errors() {
        let result: ToolResult<ErrorOutput> =
            inline_failure("t", Err(ToolError::query("bad syntax", None)), ErrorOutput::new);
        assert_eq!(result.unwrap(), ErrorOutput::new("bad syntax"));
    }

    #[test]
    fn test_inline_failure_folds_timeouts() {
        let result: ToolResult<ErrorOutput> =
            inline_failure("t", Err(ToolError::timeout("statement execution", 30)), ErrorOutput::new);
        assert_eq!(
            result.unwrap().error,
            "Timeout: statement execution exceeded 30s"
        );
    }

    #[test]
    fn test_inline_failure_passes_connection_errors() {
        let result: ToolResult<ErrorOutput> = inline_failure(
            "t",
            Err(ToolError::connection("refused", "start the server")),
            ErrorOutput::new,
        );
        assert!(matches!(result, Err(ToolError::Connection { .. })));
    }
}
