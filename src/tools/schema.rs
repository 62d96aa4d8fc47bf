//! Schema tools implementation.
//!
//! This module implements the catalog-reading tools:
//! - `get_schema`: one table in detail, or every table with its columns
//! - `get_table_info`: `get_schema` plus row count and sample rows
//! - `get_table_stats`: space usage per table
//! - `search_tables`: substring search over table and column names

use crate::db::{
    BoundStatement, ColumnInfo, ConnectionManager, DatabaseType, DbPool, ForeignKeyInfo,
    IndexInfo, QueryExecutor, RowSet, SchemaInspector, bind_named, normalize,
};
use crate::error::{ToolError, ToolResult};
use crate::tools::{ErrorOutput, inline_failure};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, info};

fn default_true() -> bool {
    true
}

fn default_sample_rows() -> u32 {
    5
}

/// Input for the get_schema tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetSchemaInput {
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default = "default_true")]
    pub include_columns: bool,
    #[serde(default)]
    pub include_indexes: bool,
}

/// Detailed description of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexes: Option<Vec<IndexInfo>>,
}

/// Abbreviated column entry used in the catalog-wide listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}

impl From<ColumnInfo> for ColumnSummary {
    fn from(col: ColumnInfo) -> Self {
        Self {
            name: col.name,
            data_type: col.data_type,
            nullable: col.nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<ColumnSummary>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseSchema {
    pub database: Option<String>,
    pub table_count: usize,
    pub tables: Vec<TableSummary>,
}

/// Output from the get_schema tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchemaOutput {
    Table(TableSchema),
    Database(DatabaseSchema),
    Error(ErrorOutput),
}

/// Input for the get_table_info tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableInfoInput {
    pub table_name: String,
    #[serde(default = "default_sample_rows")]
    pub sample_rows: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    #[serde(flatten)]
    pub schema: TableSchema,
    pub row_count: i64,
    pub sample_data: Vec<Map<String, JsonValue>>,
}

/// Output from the get_table_info tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TableInfoOutput {
    Info(TableInfo),
    Error(ErrorOutput),
}

/// Input for the get_table_stats tool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableStatsInput {
    #[serde(default)]
    pub table_name: Option<String>,
}

/// Output from the get_table_stats tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TableStatsOutput {
    Stats {
        success: bool,
        statistics: Vec<Map<String, JsonValue>>,
    },
    Error(ErrorOutput),
}

/// What `search_tables` matches against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Table,
    Column,
    #[default]
    Both,
}

impl SearchType {
    fn tables(self) -> bool {
        matches!(self, Self::Table | Self::Both)
    }

    fn columns(self) -> bool {
        matches!(self, Self::Column | Self::Both)
    }
}

/// Input for the search_tables tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchTablesInput {
    pub search_term: String,
    #[serde(default)]
    pub search_type: SearchType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableMatch {
    pub table_name: JsonValue,
    pub schema: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMatch {
    pub table_name: JsonValue,
    pub column_name: JsonValue,
    pub data_type: JsonValue,
    pub is_nullable: JsonValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub tables: Vec<TableMatch>,
    pub columns: Vec<ColumnMatch>,
}

/// Output from the search_tables tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchOutput {
    Found {
        success: bool,
        search_term: String,
        results: SearchResults,
    },
    Error(ErrorOutput),
}

pub struct SchemaToolHandler {
    connection_manager: Arc<ConnectionManager>,
    executor: QueryExecutor,
}

impl SchemaToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>, executor: QueryExecutor) -> Self {
        Self {
            connection_manager,
            executor,
        }
    }

    pub async fn get_schema(&self, input: GetSchemaInput) -> ToolResult<SchemaOutput> {
        let pool = self.connection_manager.ensure_connected().await?;
        let inspector = SchemaInspector::new(pool, &self.executor);

        let result = match input.table_name.as_deref() {
            Some(table) => {
                describe_table(&inspector, table, input.include_columns, input.include_indexes)
                    .await
            }
            None => self.describe_database(&inspector, input.include_columns).await,
        };
        inline_failure("get_schema", result, |e| SchemaOutput::Error(ErrorOutput::new(e)))
    }

    async fn describe_database(
        &self,
        inspector: &SchemaInspector<'_>,
        include_columns: bool,
    ) -> ToolResult<SchemaOutput> {
        let names = inspector.table_names().await?;
        let mut tables = Vec::with_capacity(names.len());
        for table_name in names {
            let columns = if include_columns {
                let cols = inspector.columns(&table_name).await?;
                Some(cols.into_iter().map(ColumnSummary::from).collect())
            } else {
                None
            };
            tables.push(TableSummary {
                table_name,
                columns,
            });
        }
        info!(tables = tables.len(), "Listed database schema");

        Ok(SchemaOutput::Database(DatabaseSchema {
            database: self.connection_manager.database_name().map(String::from),
            table_count: tables.len(),
            tables,
        }))
    }

    pub async fn get_table_info(&self, input: TableInfoInput) -> ToolResult<TableInfoOutput> {
        let pool = self.connection_manager.ensure_connected().await?;
        let inspector = SchemaInspector::new(pool, &self.executor);

        let schema = match describe_table(&inspector, &input.table_name, true, true).await {
            Ok(SchemaOutput::Table(schema)) => Ok(schema),
            Ok(SchemaOutput::Error(err)) => return Ok(TableInfoOutput::Error(err)),
            Ok(SchemaOutput::Database(_)) => {
                return Err(ToolError::query("unexpected catalog-wide schema", None));
            }
            Err(e) => Err(e),
        };

        let result = match schema {
            Ok(schema) => self.fill_table_info(pool, schema, input.sample_rows).await,
            Err(e) => Err(e),
        };
        inline_failure("get_table_info", result, |e| {
            TableInfoOutput::Error(ErrorOutput::new(e))
        })
    }

    async fn fill_table_info(
        &self,
        pool: &DbPool,
        schema: TableSchema,
        sample_rows: u32,
    ) -> ToolResult<TableInfoOutput> {
        let db_type = pool.db_type();
        let table = schema.table_name.as_str();

        let count = self
            .executor
            .fetch(pool, &BoundStatement::raw(db_type.count_rows_sql(table)))
            .await?;
        let row_count = count.row_count()?;

        let sample = self
            .executor
            .fetch(
                pool,
                &BoundStatement::raw(db_type.sample_rows_sql(table, sample_rows)),
            )
            .await?;
        debug!(table, row_count, sample = sample.len(), "Read table info");

        Ok(TableInfoOutput::Info(TableInfo {
            schema,
            row_count,
            sample_data: sample.into_mappings(),
        }))
    }

    pub async fn get_table_stats(&self, input: TableStatsInput) -> ToolResult<TableStatsOutput> {
        let pool = self.connection_manager.ensure_connected().await?;
        let db_type = pool.db_type();

        let Some(sql) = db_type.table_stats_sql(input.table_name.is_some()) else {
            return Ok(TableStatsOutput::Error(ErrorOutput::new(format!(
                "get_table_stats is not supported for {}",
                db_type
            ))));
        };

        let mut params = Map::new();
        if let Some(table) = input.table_name.as_deref() {
            params.insert("table_name".to_string(), JsonValue::from(table));
        }
        let stmt = bind_named(&sql, db_type, &params)
            .map_err(|e| ToolError::validation("get_table_stats", e))?;

        let result = self
            .executor
            .fetch(pool, &stmt)
            .await
            .map(|set| TableStatsOutput::Stats {
                success: true,
                statistics: set.into_mappings(),
            });
        inline_failure("get_table_stats", result, |e| {
            TableStatsOutput::Error(ErrorOutput::new(e))
        })
    }

    pub async fn search_tables(&self, input: SearchTablesInput) -> ToolResult<SearchOutput> {
        let pool = self.connection_manager.ensure_connected().await?;
        let result = self
            .search(pool, &input.search_term, input.search_type)
            .await
            .map(|results| SearchOutput::Found {
                success: true,
                search_term: input.search_term.clone(),
                results,
            });
        inline_failure("search_tables", result, |e| {
            SearchOutput::Error(ErrorOutput::new(e))
        })
    }

    async fn search(
        &self,
        pool: &DbPool,
        term: &str,
        search_type: SearchType,
    ) -> ToolResult<SearchResults> {
        let db_type = pool.db_type();
        let mut params = Map::new();
        params.insert("search_term".to_string(), JsonValue::from(format!("%{}%", term)));

        let mut results = SearchResults::default();
        if search_type.tables() {
            let rows = self
                .fetch_bound(pool, db_type, db_type.search_tables_sql(), &params)
                .await?;
            results.tables = positional(rows)
                .map(|mut row| TableMatch {
                    table_name: take(&mut row, 0),
                    schema: take(&mut row, 1),
                })
                .collect();
        }
        if search_type.columns() {
            let rows = self
                .fetch_bound(pool, db_type, db_type.search_columns_sql(), &params)
                .await?;
            results.columns = positional(rows)
                .map(|mut row| ColumnMatch {
                    table_name: take(&mut row, 0),
                    column_name: take(&mut row, 1),
                    data_type: take(&mut row, 2),
                    is_nullable: take(&mut row, 3),
                })
                .collect();
        }
        debug!(
            term,
            tables = results.tables.len(),
            columns = results.columns.len(),
            "Search finished"
        );
        Ok(results)
    }

    async fn fetch_bound(
        &self,
        pool: &DbPool,
        db_type: DatabaseType,
        sql: &str,
        params: &Map<String, JsonValue>,
    ) -> ToolResult<RowSet> {
        let stmt = bind_named(sql, db_type, params)
            .map_err(|e| ToolError::validation("search_tables", e))?;
        self.executor.fetch(pool, &stmt).await
    }
}

/// Assemble the detailed schema of one table, or the not-found error.
async fn describe_table(
    inspector: &SchemaInspector<'_>,
    table: &str,
    include_columns: bool,
    include_indexes: bool,
) -> ToolResult<SchemaOutput> {
    if !inspector.table_exists(table).await? {
        return Ok(SchemaOutput::Error(ErrorOutput::new(format!(
            "Table '{}' not found",
            table
        ))));
    }

    let columns = if include_columns {
        inspector.columns(table).await?
    } else {
        Vec::new()
    };
    let primary_keys = inspector.primary_key(table).await?;
    let foreign_keys = inspector.foreign_keys(table).await?;
    let indexes = if include_indexes {
        Some(inspector.indexes(table).await?)
    } else {
        None
    };

    Ok(SchemaOutput::Table(TableSchema {
        table_name: table.to_string(),
        columns,
        primary_keys,
        foreign_keys,
        indexes,
    }))
}

/// Rows as normalized positional values; catalog column names vary in case
/// between engines, so search results are read by position.
fn positional(set: RowSet) -> impl Iterator<Item = Vec<JsonValue>> {
    set.rows
        .into_iter()
        .map(|row| row.into_iter().map(normalize).collect())
}

fn take(row: &mut [JsonValue], idx: usize) -> JsonValue {
    row.get_mut(idx).map(JsonValue::take).unwrap_or(JsonValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionSettings;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn handler_with(setup: &[&str]) -> (SchemaToolHandler, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.db");
        let manager = Arc::new(ConnectionManager::new(ConnectionSettings::sqlite(
            path.to_string_lossy(),
        )));
        let executor = QueryExecutor::new(Duration::from_secs(5));
        let pool = manager.ensure_connected().await.unwrap();
        for sql in setup {
            executor.run(pool, &BoundStatement::raw(*sql)).await.unwrap();
        }
        (SchemaToolHandler::new(manager, executor), dir)
    }

    const SHOP: &[&str] = &[
        "CREATE TABLE Customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT DEFAULT 'Oslo')",
        "CREATE TABLE CustomerAddress (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES Customers(id), street TEXT)",
        "CREATE TABLE Orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES Customers(id), total REAL)",
        "CREATE INDEX idx_orders_customer ON Orders (customer_id)",
        "INSERT INTO Customers (id, name) VALUES (1, 'Ada'), (2, 'Brian'), (3, 'Cleo')",
    ];

    fn schema_input(table: Option<&str>, columns: bool, indexes: bool) -> GetSchemaInput {
        GetSchemaInput {
            table_name: table.map(String::from),
            include_columns: columns,
            include_indexes: indexes,
        }
    }

    #[tokio::test]
    async fn test_get_schema_missing_table() {
        let (handler, _dir) = handler_with(SHOP).await;
        let output = handler
            .get_schema(schema_input(Some("nonexistent_table"), true, false))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"error": "Table 'nonexistent_table' not found"})
        );
    }

    #[tokio::test]
    async fn test_get_schema_single_table() {
        let (handler, _dir) = handler_with(SHOP).await;
        let output = handler
            .get_schema(schema_input(Some("Orders"), true, true))
            .await
            .unwrap();
        let SchemaOutput::Table(table) = output else {
            panic!("expected table schema");
        };
        assert_eq!(table.table_name, "Orders");
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "customer_id", "total"]);
        assert_eq!(table.primary_keys, vec!["id"]);
        assert_eq!(table.foreign_keys.len(), 1);
        assert_eq!(table.foreign_keys[0].referred_table, "Customers");
        let indexes = table.indexes.unwrap();
        assert!(indexes.iter().any(|i| i.name == "idx_orders_customer" && !i.unique));
    }

    #[tokio::test]
    async fn test_get_schema_without_columns_or_indexes() {
        let (handler, _dir) = handler_with(SHOP).await;
        let output = handler
            .get_schema(schema_input(Some("Customers"), false, false))
            .await
            .unwrap();
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["columns"], json!([]));
        assert!(value.get("indexes").is_none());
        assert_eq!(value["primary_keys"], json!(["id"]));
    }

    #[tokio::test]
    async fn test_get_schema_whole_database() {
        let (handler, _dir) = handler_with(SHOP).await;
        let output = handler.get_schema(schema_input(None, true, false)).await.unwrap();
        let SchemaOutput::Database(db) = output else {
            panic!("expected database schema");
        };
        assert_eq!(db.table_count, 3);
        let customers = db.tables.iter().find(|t| t.table_name == "Customers").unwrap();
        let columns = customers.columns.as_ref().unwrap();
        assert_eq!(columns[1].name, "name");
        assert!(!columns[1].nullable);
        assert!(db.database.unwrap().ends_with("schema.db"));
    }

    #[tokio::test]
    async fn test_get_schema_database_without_columns() {
        let (handler, _dir) = handler_with(SHOP).await;
        let output = handler.get_schema(schema_input(None, false, false)).await.unwrap();
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["tables"][0], json!({"table_name": "CustomerAddress"}));
    }

    #[tokio::test]
    async fn test_get_table_info_counts_and_samples() {
        let (handler, _dir) = handler_with(SHOP).await;
        let output = handler
            .get_table_info(TableInfoInput {
                table_name: "Customers".into(),
                sample_rows: 2,
            })
            .await
            .unwrap();
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["table_name"], "Customers");
        assert_eq!(value["row_count"], 3);
        assert_eq!(value["sample_data"].as_array().unwrap().len(), 2);
        assert_eq!(value["sample_data"][0]["name"], "Ada");
        assert_eq!(value["indexes"], json!([]));
    }

    #[tokio::test]
    async fn test_get_table_info_missing_table() {
        let (handler, _dir) = handler_with(SHOP).await;
        let output = handler
            .get_table_info(TableInfoInput {
                table_name: "Nope".into(),
                sample_rows: 5,
            })
            .await
            .unwrap();
        assert_eq!(
            output,
            TableInfoOutput::Error(ErrorOutput::new("Table 'Nope' not found"))
        );
    }

    #[tokio::test]
    async fn test_table_stats_unsupported_on_sqlite() {
        let (handler, _dir) = handler_with(SHOP).await;
        let output = handler.get_table_stats(TableStatsInput::default()).await.unwrap();
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"error": "get_table_stats is not supported for SQLite"})
        );
    }

    #[tokio::test]
    async fn test_search_tables_only() {
        let (handler, _dir) = handler_with(SHOP).await;
        let output = handler
            .search_tables(SearchTablesInput {
                search_term: "cust".into(),
                search_type: SearchType::Table,
            })
            .await
            .unwrap();
        let SearchOutput::Found { results, .. } = output else {
            panic!("expected results");
        };
        let mut names: Vec<_> = results
            .tables
            .iter()
            .map(|t| t.table_name.as_str().unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["CustomerAddress", "Customers"]);
        assert!(results.columns.is_empty());
    }

    #[tokio::test]
    async fn test_search_columns() {
        let (handler, _dir) = handler_with(SHOP).await;
        let output = handler
            .search_tables(SearchTablesInput {
                search_term: "customer_id".into(),
                search_type: SearchType::Column,
            })
            .await
            .unwrap();
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["search_term"], "customer_id");
        assert_eq!(value["results"]["tables"], json!([]));
        let columns = value["results"]["columns"].as_array().unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0]["table_name"], "CustomerAddress");
        assert_eq!(columns[0]["is_nullable"], "YES");
    }

    #[test]
    fn test_search_type_parses_lowercase() {
        let parsed: SearchTablesInput =
            serde_json::from_value(json!({"search_term": "x", "search_type": "column"})).unwrap();
        assert_eq!(parsed.search_type, SearchType::Column);
        let parsed: SearchTablesInput = serde_json::from_value(json!({"search_term": "x"})).unwrap();
        assert_eq!(parsed.search_type, SearchType::Both);
    }
}
