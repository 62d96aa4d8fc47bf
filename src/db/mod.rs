//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management
//! - Dialect-specific SQL generation
//! - Named parameter binding
//! - Statement execution
//! - Schema introspection
//! - Value decoding and normalization

pub mod dialect;
pub mod executor;
pub mod params;
pub mod pool;
pub mod schema;
pub mod types;

pub use dialect::{DatabaseType, InferredType};
pub use executor::{QueryExecutor, StatementOutcome};
pub use params::{BoundStatement, QueryParam, bind_named};
pub use pool::{ConnectionManager, DbPool};
pub use schema::{ColumnInfo, ForeignKeyInfo, IndexInfo, SchemaInspector};
pub use types::{RowSet, SqlValue, normalize, rows_to_mappings};
