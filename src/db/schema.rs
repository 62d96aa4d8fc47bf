//! Schema introspection module.
//!
//! This module reads table, column, key and index metadata from each engine's
//! catalog.
//!
//! # Architecture
//!
//! Catalog queries live in the `queries` submodule, one submodule per engine,
//! all returning the same column aliases. The inspector runs them through the
//! shared `QueryExecutor` and folds the rows into typed descriptions, so the
//! folding logic is written once.

use crate::db::DatabaseType;
use crate::db::executor::QueryExecutor;
use crate::db::params::{BoundStatement, bind_named};
use crate::db::pool::DbPool;
use crate::db::types::truthy;
use crate::error::{ToolError, ToolResult};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

/// Column description as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeyInfo {
    pub columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Schema inspector bound to one pool.
pub struct SchemaInspector<'a> {
    pool: &'a DbPool,
    executor: &'a QueryExecutor,
}

impl<'a> SchemaInspector<'a> {
    pub fn new(pool: &'a DbPool, executor: &'a QueryExecutor) -> Self {
        Self { pool, executor }
    }

    fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    /// Names of the user tables in the default schema, sorted.
    pub async fn table_names(&self) -> ToolResult<Vec<String>> {
        let rows = self
            .fetch(queries::for_engine(self.db_type()).list_tables, None)
            .await?;
        Ok(rows.iter().filter_map(|row| text(row, "table_name")).collect())
    }

    /// Whether `table_name` is one of `table_names()` (exact, case-sensitive).
    pub async fn table_exists(&self, table_name: &str) -> ToolResult<bool> {
        Ok(self.table_names().await?.iter().any(|t| t == table_name))
    }

    /// Columns in declaration order.
    pub async fn columns(&self, table_name: &str) -> ToolResult<Vec<ColumnInfo>> {
        let rows = self
            .fetch(queries::for_engine(self.db_type()).columns, Some(table_name))
            .await?;
        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: text(row, "name").unwrap_or_default(),
                data_type: text(row, "data_type").unwrap_or_default(),
                nullable: row.get("nullable").is_some_and(truthy),
                default: text(row, "column_default"),
            })
            .collect())
    }

    /// Primary key columns in key order.
    pub async fn primary_key(&self, table_name: &str) -> ToolResult<Vec<String>> {
        let rows = self
            .fetch(queries::for_engine(self.db_type()).primary_key, Some(table_name))
            .await?;
        Ok(rows.iter().filter_map(|row| text(row, "column_name")).collect())
    }

    pub async fn foreign_keys(&self, table_name: &str) -> ToolResult<Vec<ForeignKeyInfo>> {
        let rows = self
            .fetch(queries::for_engine(self.db_type()).foreign_keys, Some(table_name))
            .await?;

        let mut keys: Vec<(String, ForeignKeyInfo)> = Vec::new();
        for row in &rows {
            let constraint = group_key(row, "constraint_name");
            let column = text(row, "column_name").unwrap_or_default();
            let referred_column = text(row, "referred_column").unwrap_or_default();
            match keys.iter_mut().find(|(name, _)| *name == constraint) {
                Some((_, fk)) => {
                    fk.columns.push(column);
                    fk.referred_columns.push(referred_column);
                }
                None => keys.push((
                    constraint,
                    ForeignKeyInfo {
                        columns: vec![column],
                        referred_table: text(row, "referred_table").unwrap_or_default(),
                        referred_columns: vec![referred_column],
                    },
                )),
            }
        }
        Ok(keys.into_iter().map(|(_, fk)| fk).collect())
    }

    /// Secondary indexes; the primary key index is excluded.
    pub async fn indexes(&self, table_name: &str) -> ToolResult<Vec<IndexInfo>> {
        let rows = self
            .fetch(queries::for_engine(self.db_type()).indexes, Some(table_name))
            .await?;

        let mut indexes: Vec<IndexInfo> = Vec::new();
        for row in &rows {
            let name = text(row, "index_name").unwrap_or_default();
            let column = text(row, "column_name").unwrap_or_default();
            match indexes.iter_mut().find(|idx| idx.name == name) {
                Some(idx) => idx.columns.push(column),
                None => indexes.push(IndexInfo {
                    name,
                    columns: vec![column],
                    unique: row.get("is_unique").is_some_and(truthy),
                }),
            }
        }
        Ok(indexes)
    }

    async fn fetch(
        &self,
        sql: &str,
        table_name: Option<&str>,
    ) -> ToolResult<Vec<Map<String, JsonValue>>> {
        let stmt = match table_name {
            Some(table) => {
                let mut params = Map::new();
                params.insert("table_name".to_string(), JsonValue::from(table));
                bind_named(sql, self.db_type(), &params)
                    .map_err(|e| ToolError::validation("schema introspection", e))?
            }
            None => BoundStatement::raw(sql),
        };
        debug!(table = ?table_name, "Reading catalog");
        Ok(self.executor.fetch(self.pool, &stmt).await?.into_mappings())
    }
}

fn text(row: &Map<String, JsonValue>, key: &str) -> Option<String> {
    match row.get(key)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Constraint identifiers may be numeric (SQLite); compare them as text.
fn group_key(row: &Map<String, JsonValue>, key: &str) -> String {
    text(row, key).unwrap_or_default()
}

// =============================================================================
// SQL Query Templates
// =============================================================================
//
// Every engine answers the same five questions with the same column aliases:
// list_tables(table_name), columns(name, data_type, nullable, column_default),
// primary_key(column_name), foreign_keys(constraint_name, column_name,
// referred_table, referred_column), indexes(index_name, column_name, is_unique).

mod queries {
    use crate::db::DatabaseType;

    pub struct CatalogQueries {
        pub list_tables: &'static str,
        pub columns: &'static str,
        pub primary_key: &'static str,
        pub foreign_keys: &'static str,
        pub indexes: &'static str,
    }

    pub fn for_engine(db_type: DatabaseType) -> &'static CatalogQueries {
        match db_type {
            DatabaseType::Mssql => &MSSQL,
            DatabaseType::Postgres => &POSTGRES,
            DatabaseType::MySql => &MYSQL,
            DatabaseType::SQLite => &SQLITE,
        }
    }

    static MSSQL: CatalogQueries = CatalogQueries {
        list_tables: r#"
            SELECT TABLE_NAME AS table_name
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = SCHEMA_NAME()
            ORDER BY TABLE_NAME
        "#,
        columns: r#"
            SELECT
                c.COLUMN_NAME AS name,
                UPPER(c.DATA_TYPE) + CASE
                    WHEN c.CHARACTER_MAXIMUM_LENGTH = -1 THEN '(max)'
                    WHEN c.DATA_TYPE IN ('char', 'varchar', 'nchar', 'nvarchar', 'binary', 'varbinary')
                        THEN '(' + CAST(c.CHARACTER_MAXIMUM_LENGTH AS varchar(10)) + ')'
                    WHEN c.DATA_TYPE IN ('decimal', 'numeric')
                        THEN '(' + CAST(c.NUMERIC_PRECISION AS varchar(10)) + ', '
                            + CAST(c.NUMERIC_SCALE AS varchar(10)) + ')'
                    ELSE ''
                END AS data_type,
                CASE WHEN c.IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS nullable,
                c.COLUMN_DEFAULT AS column_default
            FROM INFORMATION_SCHEMA.COLUMNS c
            WHERE c.TABLE_NAME = :table_name AND c.TABLE_SCHEMA = SCHEMA_NAME()
            ORDER BY c.ORDINAL_POSITION
        "#,
        primary_key: r#"
            SELECT kcu.COLUMN_NAME AS column_name
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
                AND tc.TABLE_NAME = kcu.TABLE_NAME
            WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
                AND tc.TABLE_NAME = :table_name
                AND tc.TABLE_SCHEMA = SCHEMA_NAME()
            ORDER BY kcu.ORDINAL_POSITION
        "#,
        foreign_keys: r#"
            SELECT
                fk.name AS constraint_name,
                pc.name AS column_name,
                rt.name AS referred_table,
                rc.name AS referred_column
            FROM sys.foreign_keys fk
            JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
            JOIN sys.columns pc
                ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
            JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id
            JOIN sys.columns rc
                ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
            WHERE fk.parent_object_id = OBJECT_ID(QUOTENAME(SCHEMA_NAME()) + '.' + QUOTENAME(:table_name))
            ORDER BY fk.name, fkc.constraint_column_id
        "#,
        indexes: r#"
            SELECT i.name AS index_name, c.name AS column_name, i.is_unique AS is_unique
            FROM sys.indexes i
            JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
            JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
            WHERE i.object_id = OBJECT_ID(QUOTENAME(SCHEMA_NAME()) + '.' + QUOTENAME(:table_name))
                AND i.is_primary_key = 0
                AND i.name IS NOT NULL
                AND ic.is_included_column = 0
            ORDER BY i.name, ic.key_ordinal
        "#,
    };

    static POSTGRES: CatalogQueries = CatalogQueries {
        list_tables: r#"
            SELECT tablename::text AS table_name
            FROM pg_catalog.pg_tables
            WHERE schemaname = current_schema()
            ORDER BY tablename
        "#,
        columns: r#"
            SELECT
                a.attname::text AS name,
                format_type(a.atttypid, a.atttypmod) AS data_type,
                NOT a.attnotnull AS nullable,
                pg_get_expr(d.adbin, d.adrelid) AS column_default
            FROM pg_attribute a
            JOIN pg_class t ON t.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE t.relname = :table_name
                AND n.nspname = current_schema()
                AND a.attnum > 0
                AND NOT a.attisdropped
            ORDER BY a.attnum
        "#,
        primary_key: r#"
            SELECT kcu.column_name::text AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
                AND tc.table_name = kcu.table_name
            WHERE tc.constraint_type = 'PRIMARY KEY'
                AND tc.table_name = :table_name
                AND tc.table_schema = current_schema()
            ORDER BY kcu.ordinal_position
        "#,
        foreign_keys: r#"
            SELECT
                con.conname::text AS constraint_name,
                a.attname::text AS column_name,
                rt.relname::text AS referred_table,
                ra.attname::text AS referred_column
            FROM pg_constraint con
            JOIN pg_class t ON t.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_class rt ON rt.oid = con.confrelid
            CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, refnum, ord)
            JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
            JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.refnum
            WHERE con.contype = 'f' AND t.relname = :table_name AND n.nspname = current_schema()
            ORDER BY con.conname, k.ord
        "#,
        indexes: r#"
            SELECT
                ic.relname::text AS index_name,
                a.attname::text AS column_name,
                ix.indisunique AS is_unique
            FROM pg_index ix
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_class ic ON ic.oid = ix.indexrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
            WHERE t.relname = :table_name AND n.nspname = current_schema() AND NOT ix.indisprimary
            ORDER BY ic.relname, k.ord
        "#,
    };

    static MYSQL: CatalogQueries = CatalogQueries {
        list_tables: r#"
            SELECT TABLE_NAME AS table_name
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#,
        columns: r#"
            SELECT
                COLUMN_NAME AS name,
                COLUMN_TYPE AS data_type,
                IS_NULLABLE AS nullable,
                COLUMN_DEFAULT AS column_default
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = :table_name
            ORDER BY ORDINAL_POSITION
        "#,
        primary_key: r#"
            SELECT COLUMN_NAME AS column_name
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = :table_name
                AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#,
        foreign_keys: r#"
            SELECT
                CONSTRAINT_NAME AS constraint_name,
                COLUMN_NAME AS column_name,
                REFERENCED_TABLE_NAME AS referred_table,
                REFERENCED_COLUMN_NAME AS referred_column
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = :table_name
                AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
        "#,
        indexes: r#"
            SELECT
                INDEX_NAME AS index_name,
                COLUMN_NAME AS column_name,
                NON_UNIQUE = 0 AS is_unique
            FROM information_schema.STATISTICS
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = :table_name
                AND INDEX_NAME <> 'PRIMARY'
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#,
    };

    static SQLITE: CatalogQueries = CatalogQueries {
        list_tables: r#"
            SELECT name AS table_name
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
        "#,
        columns: r#"
            SELECT
                name,
                type AS data_type,
                "notnull" = 0 AS nullable,
                dflt_value AS column_default
            FROM pragma_table_info(:table_name)
            ORDER BY cid
        "#,
        primary_key: r#"
            SELECT name AS column_name
            FROM pragma_table_info(:table_name)
            WHERE pk > 0
            ORDER BY pk
        "#,
        foreign_keys: r#"
            SELECT
                id AS constraint_name,
                "from" AS column_name,
                "table" AS referred_table,
                "to" AS referred_column
            FROM pragma_foreign_key_list(:table_name)
            ORDER BY id, seq
        "#,
        indexes: r#"
            SELECT il.name AS index_name, ii.name AS column_name, il."unique" AS is_unique
            FROM pragma_index_list(:table_name) AS il
            JOIN pragma_index_info(il.name) AS ii
            WHERE il.origin <> 'pk'
            ORDER BY il.name, ii.seqno
        "#,
    };
}
