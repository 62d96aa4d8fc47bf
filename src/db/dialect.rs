//! SQL dialect differences between the supported engines.
//!
//! All statement text the tools generate is built here: identifier quoting,
//! row-limit injection, sample and count queries, plan retrieval, table
//! statistics, name search and table copies.

use crate::db::params::skip_quoted;
use clap::ValueEnum;
use std::fmt;

pub const DEFAULT_SQL_SERVER_PORT: u16 = 1433;
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Database engine selected by the driver identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DatabaseType {
    /// Microsoft SQL Server
    #[default]
    #[value(name = "mssql", alias = "sqlserver")]
    Mssql,
    #[value(name = "postgres", alias = "postgresql")]
    Postgres,
    #[value(name = "mysql")]
    MySql,
    #[value(name = "sqlite")]
    SQLite,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mssql => write!(f, "SQL Server"),
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::MySql => write!(f, "MySQL"),
            Self::SQLite => write!(f, "SQLite"),
        }
    }
}

impl DatabaseType {
    pub fn default_port(self) -> Option<u16> {
        match self {
            Self::Mssql => Some(DEFAULT_SQL_SERVER_PORT),
            Self::Postgres => Some(DEFAULT_POSTGRES_PORT),
            Self::MySql => Some(DEFAULT_MYSQL_PORT),
            Self::SQLite => None,
        }
    }

    /// Whether the engine is reached over the network (and needs a host).
    pub fn is_networked(self) -> bool {
        !matches!(self, Self::SQLite)
    }

    /// Quote an identifier, doubling any closing quote character inside it.
    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Self::Mssql => format!("[{}]", ident.replace(']', "]]")),
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            Self::Postgres | Self::SQLite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Cap a read statement at `limit` rows.
    ///
    /// Detection is a case-insensitive substring scan over the statement with
    /// comments removed: it must start with SELECT and must not already mention
    /// a limiting keyword anywhere (a subquery that contains one also
    /// suppresses the rewrite). SQL Server gets `TOP n` right after the first
    /// SELECT; the other engines get a trailing `LIMIT n`. A rewritten
    /// statement is returned without its comments. A limit of zero leaves the
    /// statement untouched.
    pub fn apply_row_limit(self, sql: &str, limit: u32) -> String {
        if limit == 0 {
            return sql.to_string();
        }
        let code = self.strip_comments(sql);
        let lead = code.len() - code.trim_start().len();
        let starts_with_select = code
            .get(lead..lead + "SELECT".len())
            .is_some_and(|kw| kw.eq_ignore_ascii_case("SELECT"));
        if !starts_with_select {
            return sql.to_string();
        }
        let upper = code.to_uppercase();
        match self {
            Self::Mssql => {
                if upper.contains("TOP") || upper.contains("OFFSET") {
                    return sql.to_string();
                }
                let (select, rest) = code.trim_end().split_at(lead + "SELECT".len());
                format!("{} TOP {}{}", select, limit, rest)
            }
            Self::Postgres | Self::MySql | Self::SQLite => {
                if upper.contains("LIMIT") || upper.contains("TOP") || upper.contains("OFFSET") {
                    return sql.to_string();
                }
                let body = code.trim_end().trim_end_matches(';').trim_end();
                format!("{} LIMIT {}", body, limit)
            }
        }
    }

    /// `sql` with every comment replaced by a single space.
    ///
    /// Quoted literals and identifiers are copied verbatim, so comment markers
    /// inside them are not comments.
    pub fn strip_comments(self, sql: &str) -> String {
        let bytes = sql.as_bytes();
        let mut out = String::with_capacity(sql.len());
        let mut copied = 0;
        let mut i = 0;

        while i < bytes.len() {
            let comment_end = match bytes[i] {
                b'\'' => {
                    i = skip_quoted(bytes, i, b'\'');
                    continue;
                }
                b'"' => {
                    i = skip_quoted(bytes, i, b'"');
                    continue;
                }
                b'`' if self == Self::MySql => {
                    i = skip_quoted(bytes, i, b'`');
                    continue;
                }
                b'[' if self == Self::Mssql => {
                    i = skip_quoted(bytes, i, b']');
                    continue;
                }
                b'-' if bytes.get(i + 1) == Some(&b'-') => line_end(bytes, i),
                b'#' if self == Self::MySql => line_end(bytes, i),
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    sql[i + 2..].find("*/").map_or(bytes.len(), |p| i + 2 + p + 2)
                }
                _ => {
                    i += 1;
                    continue;
                }
            };
            out.push_str(&sql[copied..i]);
            out.push(' ');
            copied = comment_end;
            i = comment_end;
        }
        out.push_str(&sql[copied..]);
        out
    }

    pub fn count_rows_sql(self, table: &str) -> String {
        format!("SELECT COUNT(*) AS count FROM {}", self.quote_ident(table))
    }

    pub fn sample_rows_sql(self, table: &str, rows: u32) -> String {
        match self {
            Self::Mssql => format!("SELECT TOP {} * FROM {}", rows, self.quote_ident(table)),
            _ => format!("SELECT * FROM {} LIMIT {}", self.quote_ident(table), rows),
        }
    }

    /// Statement that copies a table's rows and columns into a new table.
    pub fn copy_table_sql(self, source: &str, target: &str) -> String {
        match self {
            Self::Mssql => format!(
                "SELECT * INTO {} FROM {}",
                self.quote_ident(target),
                self.quote_ident(source)
            ),
            _ => format!(
                "CREATE TABLE {} AS SELECT * FROM {}",
                self.quote_ident(target),
                self.quote_ident(source)
            ),
        }
    }

    /// Prefix that turns a statement into a plan request, for engines that
    /// have one. SQL Server uses the SHOWPLAN session setting instead.
    pub fn explain_prefix(self) -> Option<&'static str> {
        match self {
            Self::Mssql => None,
            Self::Postgres | Self::MySql => Some("EXPLAIN "),
            Self::SQLite => Some("EXPLAIN QUERY PLAN "),
        }
    }

    /// Diagnostic query returning (version, server name, database name).
    pub fn server_info_sql(self) -> &'static str {
        match self {
            Self::Mssql => {
                "SELECT @@VERSION AS version, @@SERVERNAME AS server_name, DB_NAME() AS database_name"
            }
            Self::Postgres => {
                "SELECT version() AS version, inet_server_addr()::text AS server_name, current_database() AS database_name"
            }
            Self::MySql => {
                "SELECT VERSION() AS version, @@hostname AS server_name, DATABASE() AS database_name"
            }
            Self::SQLite => {
                "SELECT sqlite_version() AS version, 'sqlite' AS server_name, 'main' AS database_name"
            }
        }
    }

    pub fn version_sql(self) -> &'static str {
        match self {
            Self::Mssql => "SELECT @@VERSION",
            Self::Postgres | Self::MySql => "SELECT version()",
            Self::SQLite => "SELECT sqlite_version()",
        }
    }

    /// Space usage per table, optionally scoped to one table bound as `:table_name`.
    pub fn table_stats_sql(self, scoped: bool) -> Option<String> {
        let sql = match self {
            Self::Mssql => {
                let filter = if scoped {
                    "WHERE t.name = :table_name\n                GROUP BY t.name, p.rows"
                } else {
                    "GROUP BY t.name, p.rows\n                ORDER BY total_space_mb DESC"
                };
                format!(
                    "SELECT
                    t.name AS table_name,
                    p.rows AS row_count,
                    CAST(ROUND(((SUM(a.total_pages) * 8) / 1024.00), 2) AS NUMERIC(36, 2)) AS total_space_mb,
                    CAST(ROUND(((SUM(a.used_pages) * 8) / 1024.00), 2) AS NUMERIC(36, 2)) AS used_space_mb,
                    CAST(ROUND(((SUM(a.total_pages) - SUM(a.used_pages)) * 8) / 1024.00, 2) AS NUMERIC(36, 2)) AS unused_space_mb
                FROM sys.tables t
                INNER JOIN sys.indexes i ON t.object_id = i.object_id
                INNER JOIN sys.partitions p ON i.object_id = p.object_id AND i.index_id = p.index_id
                INNER JOIN sys.allocation_units a ON p.partition_id = a.container_id
                {filter}"
                )
            }
            Self::Postgres => {
                let filter = if scoped {
                    "AND c.relname = :table_name"
                } else {
                    ""
                };
                format!(
                    "SELECT
                    c.relname AS table_name,
                    c.reltuples::bigint AS row_count,
                    ROUND(pg_total_relation_size(c.oid) / 1048576.0, 2) AS total_space_mb,
                    ROUND((pg_relation_size(c.oid) + COALESCE(pg_indexes_size(c.oid), 0)) / 1048576.0, 2) AS used_space_mb,
                    ROUND(GREATEST(pg_total_relation_size(c.oid) - pg_relation_size(c.oid) - COALESCE(pg_indexes_size(c.oid), 0), 0) / 1048576.0, 2) AS unused_space_mb
                FROM pg_class c
                JOIN pg_namespace n ON n.oid = c.relnamespace
                WHERE c.relkind = 'r'
                  AND n.nspname NOT IN ('pg_catalog', 'information_schema')
                  {filter}
                ORDER BY total_space_mb DESC"
                )
            }
            Self::MySql => {
                let filter = if scoped {
                    "AND table_name = :table_name"
                } else {
                    ""
                };
                format!(
                    "SELECT
                    table_name AS table_name,
                    table_rows AS row_count,
                    ROUND((data_length + index_length + data_free) / 1048576, 2) AS total_space_mb,
                    ROUND((data_length + index_length) / 1048576, 2) AS used_space_mb,
                    ROUND(data_free / 1048576, 2) AS unused_space_mb
                FROM information_schema.tables
                WHERE table_schema = DATABASE()
                  AND table_type = 'BASE TABLE'
                  {filter}
                ORDER BY total_space_mb DESC"
                )
            }
            Self::SQLite => return None,
        };
        Some(sql)
    }

    /// Table name search; binds `:search_term`.
    pub fn search_tables_sql(self) -> &'static str {
        match self {
            Self::Mssql | Self::MySql => {
                "SELECT table_name, table_schema
                FROM information_schema.tables
                WHERE table_name LIKE :search_term"
            }
            Self::Postgres => {
                "SELECT table_name::text, table_schema::text
                FROM information_schema.tables
                WHERE table_name ILIKE :search_term
                  AND table_schema NOT IN ('pg_catalog', 'information_schema')"
            }
            Self::SQLite => {
                "SELECT name AS table_name, 'main' AS table_schema
                FROM sqlite_master
                WHERE type IN ('table', 'view')
                  AND name NOT LIKE 'sqlite_%'
                  AND name LIKE :search_term"
            }
        }
    }

    /// Column name search; binds `:search_term`.
    pub fn search_columns_sql(self) -> &'static str {
        match self {
            Self::Mssql | Self::MySql => {
                "SELECT table_name, column_name, data_type, is_nullable
                FROM information_schema.columns
                WHERE column_name LIKE :search_term
                ORDER BY table_name, column_name"
            }
            Self::Postgres => {
                "SELECT table_name::text, column_name::text, data_type::text, is_nullable::text
                FROM information_schema.columns
                WHERE column_name ILIKE :search_term
                  AND table_schema NOT IN ('pg_catalog', 'information_schema')
                ORDER BY table_name, column_name"
            }
            Self::SQLite => {
                "SELECT m.name AS table_name, p.name AS column_name, p.type AS data_type,
                    CASE WHEN p.\"notnull\" = 0 THEN 'YES' ELSE 'NO' END AS is_nullable
                FROM sqlite_master m
                JOIN pragma_table_info(m.name) p
                WHERE m.type = 'table'
                  AND m.name NOT LIKE 'sqlite_%'
                  AND p.name LIKE :search_term
                ORDER BY m.name, p.name"
            }
        }
    }

    /// Column type used when creating a table from JSON rows.
    pub fn column_type_for(self, kind: InferredType) -> &'static str {
        match (self, kind) {
            (Self::Mssql, InferredType::Integer) => "BIGINT",
            (Self::Mssql, InferredType::Float) => "FLOAT",
            (Self::Mssql, InferredType::Boolean) => "BIT",
            (Self::Mssql, InferredType::Text) => "NVARCHAR(MAX)",
            (Self::Postgres, InferredType::Integer) => "BIGINT",
            (Self::Postgres, InferredType::Float) => "DOUBLE PRECISION",
            (Self::Postgres, InferredType::Boolean) => "BOOLEAN",
            (Self::Postgres, InferredType::Text) => "TEXT",
            (Self::MySql, InferredType::Integer) => "BIGINT",
            (Self::MySql, InferredType::Float) => "DOUBLE",
            (Self::MySql, InferredType::Boolean) => "BOOLEAN",
            (Self::MySql, InferredType::Text) => "TEXT",
            (Self::SQLite, InferredType::Integer) => "INTEGER",
            (Self::SQLite, InferredType::Float) => "REAL",
            (Self::SQLite, InferredType::Boolean) => "BOOLEAN",
            (Self::SQLite, InferredType::Text) => "TEXT",
        }
    }

    pub fn drop_table_if_exists_sql(self, table: &str) -> String {
        match self {
            Self::Mssql => format!(
                "IF OBJECT_ID(N'{}', N'U') IS NOT NULL DROP TABLE {}",
                table.replace('\'', "''"),
                self.quote_ident(table)
            ),
            _ => format!("DROP TABLE IF EXISTS {}", self.quote_ident(table)),
        }
    }

    pub fn create_table_sql(self, table: &str, columns: &[(String, InferredType)]) -> String {
        let defs: Vec<String> = columns
            .iter()
            .map(|(name, kind)| format!("{} {}", self.quote_ident(name), self.column_type_for(*kind)))
            .collect();
        let body = format!("{} ({})", self.quote_ident(table), defs.join(", "));
        match self {
            Self::Mssql => format!(
                "IF OBJECT_ID(N'{}', N'U') IS NULL CREATE TABLE {}",
                table.replace('\'', "''"),
                body
            ),
            _ => format!("CREATE TABLE IF NOT EXISTS {}", body),
        }
    }

    /// INSERT statement with `:c0, :c1, ...` placeholders, one per column.
    pub fn insert_row_sql(self, table: &str, columns: &[String]) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quote_ident(c)).collect();
        let placeholders: Vec<String> = (0..columns.len()).map(|i| format!(":c{}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_ident(table),
            names.join(", "),
            placeholders.join(", ")
        )
    }
}

/// Column type inferred from JSON values when creating a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferredType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl InferredType {
    /// Infer from one JSON value; `None` for null.
    pub fn of(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(_) => Some(Self::Boolean),
            serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self::Integer),
            serde_json::Value::Number(_) => Some(Self::Float),
            _ => Some(Self::Text),
        }
    }

    /// Widen two observations of the same column.
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Integer, Self::Float) | (Self::Float, Self::Integer) => Self::Float,
            _ => Self::Text,
        }
    }
}

/// Offset of the newline ending the line comment at `start` (kept as code).
fn line_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| start + p)
}
