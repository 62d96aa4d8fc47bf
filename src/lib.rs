//! SQL Server MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to query, inspect and maintain a SQL Server database. PostgreSQL, MySQL and
//! SQLite are supported through the same tools.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{ToolError, ToolResult};
pub use mcp::SqlServerService;
pub use tools::Dispatcher;
