//! SQL Server MCP Server - Main entry point.
//!
//! This server provides MCP (Model Context Protocol) tools for AI assistants
//! to work with a SQL Server database.

use clap::Parser;
use sql_server_mcp::config::{Config, TransportMode};
use sql_server_mcp::db::ConnectionManager;
use sql_server_mcp::mcp::SqlServerService;
use sql_server_mcp::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries the stdio protocol stream.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    init_tracing(&config);

    let settings = match config.connection_settings() {
        Ok(settings) => settings,
        Err(message) => {
            eprintln!("Error: {}", message);
            eprintln!();
            eprintln!("Usage: sql-server-mcp --host <host> --database <name> --username <user>");
            eprintln!();
            eprintln!("Examples:");
            eprintln!("  SQL_SERVER_HOST=db.internal SQL_SERVER_DATABASE=Sales sql-server-mcp");
            eprintln!("  sql-server-mcp --driver postgres --host localhost --database app");
            eprintln!("  sql-server-mcp --driver sqlite --database ./data.db");
            std::process::exit(1);
        }
    };

    info!(
        transport = %config.transport,
        driver = %settings.db_type,
        "Starting SQL Server MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    // The first connection is made up front; failing it is fatal.
    let connection_manager = Arc::new(ConnectionManager::new(settings));
    if let Err(e) = connection_manager.ensure_connected().await {
        error!(error = %e, suggestion = ?e.suggestion(), "Initial connection failed");
        eprintln!("Error: {}", e);
        if let Some(suggestion) = e.suggestion() {
            eprintln!("Hint: {}", suggestion);
        }
        std::process::exit(1);
    }

    let service = SqlServerService::new(
        connection_manager,
        config.query_timeout_duration(),
        config.tool_timeout_duration(),
    );

    let result = match config.transport {
        TransportMode::Stdio => {
            info!("Using stdio transport");
            StdioTransport::new(service).run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                service,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
