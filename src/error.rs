//! Error types for the SQL Server MCP server.
//!
//! Every failure a tool call can hit is one of a small set of kinds. Operations
//! fold `Query` errors into their result maps; the dispatcher renders anything
//! that still escapes as an `Error: ` text payload.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid arguments for '{tool}': {message}")]
    Validation { tool: String, message: String },

    /// Statement execution failure; displays the driver message verbatim.
    #[error("{message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        operation: Option<String>,
        table: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },
}

impl ToolError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    pub fn validation(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a query error from a driver message.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
            operation: None,
            table: None,
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// No pooled connection became free within the configured wait.
    pub fn pool_exhausted(wait: Duration) -> Self {
        Self::timeout("connection pool acquire", wait.as_secs())
    }

    /// Attach the operation and table a query error happened in.
    pub fn in_operation(self, op: &str, table_name: Option<&str>) -> Self {
        match self {
            Self::Query {
                message, sql_state, ..
            } => Self::Query {
                message,
                sql_state,
                operation: Some(op.to_string()),
                table: table_name.map(String::from),
            },
            other => other,
        }
    }

    /// Operation and table attached by [`ToolError::in_operation`].
    pub fn context(&self) -> (Option<&str>, Option<&str>) {
        match self {
            Self::Query {
                operation, table, ..
            } => (operation.as_deref(), table.as_deref()),
            _ => (None, None),
        }
    }

    /// Short tag naming the error kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "ConnectionError",
            Self::UnknownTool { .. } => "UnknownTool",
            Self::Validation { .. } => "ValidationError",
            Self::Query { .. } | Self::Timeout { .. } => "QueryError",
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Convert sqlx errors to ToolError.
impl From<sqlx::Error> for ToolError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => ToolError::connection(
                msg.to_string(),
                "Check the connection settings and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                ToolError::query(db_err.message(), code)
            }
            sqlx::Error::PoolTimedOut => ToolError::connection(
                "Timed out waiting for a pooled connection",
                "Increase the connection limit or the acquire timeout",
            ),
            sqlx::Error::PoolClosed => {
                ToolError::connection("Connection pool is closed", "Restart the server")
            }
            sqlx::Error::Io(io_err) => ToolError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => ToolError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => ToolError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            other => ToolError::query(other.to_string(), None),
        }
    }
}

/// Convert tiberius errors to ToolError.
impl From<tiberius::error::Error> for ToolError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error as TdsError;
        match err {
            TdsError::Server(token) => {
                ToolError::query(token.message().to_string(), Some(token.code().to_string()))
            }
            TdsError::Io { kind, message } => ToolError::connection(
                format!("I/O error ({:?}): {}", kind, message),
                "Check network connectivity and database server status",
            ),
            TdsError::Tls(msg) => ToolError::connection(
                format!("TLS error: {}", msg),
                "Set SQL_SERVER_TRUST_CERT=true for self-signed certificates",
            ),
            TdsError::Routing { host, port } => ToolError::connection(
                format!("Server requested routing to {}:{}", host, port),
                "Connect to the routed host directly",
            ),
            other => ToolError::query(other.to_string(), None),
        }
    }
}

/// Failures raised by the SQL Server pool manager.
impl From<bb8_tiberius::Error> for ToolError {
    fn from(err: bb8_tiberius::Error) -> Self {
        match err {
            bb8_tiberius::Error::Tiberius(e) => e.into(),
            bb8_tiberius::Error::Io(e) => ToolError::connection(
                format!("I/O error: {}", e),
                "Check that SQL Server is reachable",
            ),
        }
    }
}

/// Result type alias for tool and database operations.
pub type ToolResult<T> = Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool_names_the_tool() {
        let err = ToolError::unknown_tool("drop_everything");
        assert_eq!(err.to_string(), "Unknown tool: drop_everything");
        assert_eq!(err.kind(), "UnknownTool");
    }

    #[test]
    fn test_query_error_displays_driver_message() {
        let err = ToolError::query("Invalid object name 'Orderz'.", Some("208".into()));
        assert_eq!(err.to_string(), "Invalid object name 'Orderz'.");
    }

    #[test]
    fn test_in_operation_keeps_message() {
        let err = ToolError::query("boom", None).in_operation("backup_table", Some("Orders"));
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.context(), (Some("backup_table"), Some("Orders")));
    }

    #[test]
    fn test_in_operation_leaves_other_kinds() {
        let err = ToolError::connection("down", "retry").in_operation("x", None);
        assert!(matches!(err, ToolError::Connection { .. }));
        assert_eq!(err.context(), (None, None));
    }

    #[test]
    fn test_pool_manager_io_error_is_connection_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: ToolError = bb8_tiberius::Error::Io(io).into();
        assert_eq!(err.kind(), "ConnectionError");
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_pool_manager_tds_error_keeps_tds_mapping() {
        let tls = tiberius::error::Error::Tls("bad certificate".into());
        let err: ToolError = bb8_tiberius::Error::Tiberius(tls).into();
        assert_eq!(
            err.suggestion(),
            Some("Set SQL_SERVER_TRUST_CERT=true for self-signed certificates")
        );

        let protocol = tiberius::error::Error::Protocol("unexpected token".into());
        let err: ToolError = bb8_tiberius::Error::Tiberius(protocol).into();
        assert_eq!(err.kind(), "QueryError");
    }

    #[test]
    fn test_pool_exhausted_reports_configured_wait() {
        let err = ToolError::pool_exhausted(Duration::from_secs(7));
        assert_eq!(err.to_string(), "Timeout: connection pool acquire exceeded 7s");
    }

    #[test]
    fn test_sqlx_pool_timeout_has_no_fixed_wait() {
        let err: ToolError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.kind(), "ConnectionError");
        assert!(!err.to_string().contains("30"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ToolError::timeout("q", 3).kind(), "QueryError");
        assert_eq!(ToolError::validation("t", "m").kind(), "ValidationError");
        assert_eq!(ToolError::connection("m", "s").kind(), "ConnectionError");
    }
}
