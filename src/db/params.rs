//! Named parameter handling.
//!
//! Statements are written with `:name` placeholders. Before execution they are
//! rewritten into the engine's positional form (`@P1`, `$1`, `?`) and the values
//! are collected in binding order.

use crate::db::DatabaseType;
use serde_json::{Map, Value as JsonValue};
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};

/// A single bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Arrays and objects; bound as JSON text.
    Json(JsonValue),
}

impl From<&JsonValue> for QueryParam {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::String(s.clone()),
            other => Self::Json(other.clone()),
        }
    }
}

/// A statement rewritten for one engine, with its parameters in binding order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl BoundStatement {
    /// A statement with no placeholders, passed through untouched.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// Rewrite `:name` placeholders into `db_type`'s positional syntax.
///
/// Quoted literals, quoted identifiers, comments and `::` casts are copied
/// verbatim. Each occurrence binds its value again, so a repeated name yields
/// repeated parameters. Returns an error naming the first placeholder that
/// has no entry in `params`.
pub fn bind_named(
    sql: &str,
    db_type: DatabaseType,
    params: &Map<String, JsonValue>,
) -> Result<BoundStatement, String> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut bound = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => i = skip_quoted(bytes, i, b'\''),
            b'"' => i = skip_quoted(bytes, i, b'"'),
            b'`' if db_type == DatabaseType::MySql => i = skip_quoted(bytes, i, b'`'),
            b'[' if db_type == DatabaseType::Mssql => i = skip_quoted(bytes, i, b']'),
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |p| i + p + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |p| i + 2 + p + 2);
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                // Cast operator; step over every consecutive colon.
                while i < bytes.len() && bytes[i] == b':' {
                    i += 1;
                }
            }
            b':' if bytes.get(i + 1).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') => {
                let start = i + 1;
                let end = bytes[start..]
                    .iter()
                    .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
                    .map_or(bytes.len(), |p| start + p);
                let name = &sql[start..end];
                let value = params
                    .get(name)
                    .ok_or_else(|| format!("missing value for parameter ':{}'", name))?;

                out.push_str(&sql[copied..i]);
                bound.push(QueryParam::from(value));
                out.push_str(&placeholder(db_type, bound.len()));
                copied = end;
                i = end;
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);

    Ok(BoundStatement {
        sql: out,
        params: bound,
    })
}

/// Positional placeholder for the `n`th (1-based) parameter.
fn placeholder(db_type: DatabaseType, n: usize) -> String {
    match db_type {
        DatabaseType::Mssql => format!("@P{}", n),
        DatabaseType::Postgres => format!("${}", n),
        DatabaseType::MySql | DatabaseType::SQLite => "?".to_string(),
    }
}

/// Index just past the closing delimiter of a quoted run starting at `start`.
/// A doubled closing delimiter is an escape and does not end the run.
pub(crate) fn skip_quoted(bytes: &[u8], start: usize, close: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == close {
            if bytes.get(i + 1) == Some(&close) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        // SQLite doesn't have native JSON type, store as string
        QueryParam::Json(v) => query.bind(v.to_string()),
    }
}

/// Bind a parameter to a SQL Server query.
pub(crate) fn bind_tds_param<'a>(query: &mut tiberius::Query<'a>, param: &'a QueryParam) {
    match param {
        QueryParam::Null => query.bind(Option::<&str>::None),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_rewrites_per_engine() {
        let p = params(json!({"id": 7, "name": "Ann"}));
        let sql = "SELECT * FROM t WHERE id = :id AND name = :name";

        let mssql = bind_named(sql, DatabaseType::Mssql, &p).unwrap();
        assert_eq!(mssql.sql, "SELECT * FROM t WHERE id = @P1 AND name = @P2");
        assert_eq!(
            mssql.params,
            vec![QueryParam::Int(7), QueryParam::String("Ann".into())]
        );

        let pg = bind_named(sql, DatabaseType::Postgres, &p).unwrap();
        assert_eq!(pg.sql, "SELECT * FROM t WHERE id = $1 AND name = $2");

        let sqlite = bind_named(sql, DatabaseType::SQLite, &p).unwrap();
        assert_eq!(sqlite.sql, "SELECT * FROM t WHERE id = ? AND name = ?");
    }

    #[test]
    fn test_repeated_name_binds_twice() {
        let p = params(json!({"v": 1}));
        let bound = bind_named("SELECT :v + :v", DatabaseType::Postgres, &p).unwrap();
        assert_eq!(bound.sql, "SELECT $1 + $2");
        assert_eq!(bound.params.len(), 2);
    }

    #[test]
    fn test_skips_literals_comments_and_casts() {
        let p = params(json!({"x": "a"}));
        let sql = "SELECT ':nope', \"col:x\", id::text -- :nope\n/* :nope */ FROM t WHERE a = :x";
        let bound = bind_named(sql, DatabaseType::Postgres, &p).unwrap();
        assert_eq!(
            bound.sql,
            "SELECT ':nope', \"col:x\", id::text -- :nope\n/* :nope */ FROM t WHERE a = $1"
        );
        assert_eq!(bound.params, vec![QueryParam::String("a".into())]);
    }

    #[test]
    fn test_escaped_quote_inside_literal() {
        let p = params(json!({"x": 1}));
        let bound = bind_named("SELECT 'it''s :x' , :x", DatabaseType::SQLite, &p).unwrap();
        assert_eq!(bound.sql, "SELECT 'it''s :x' , ?");
    }

    #[test]
    fn test_bracket_identifiers_only_for_sql_server() {
        let p = params(json!({"x": 1}));
        let bound = bind_named("SELECT [a:x] FROM t", DatabaseType::Mssql, &p).unwrap();
        assert_eq!(bound.sql, "SELECT [a:x] FROM t");
        assert!(bound.params.is_empty());
    }

    #[test]
    fn test_missing_parameter_is_reported() {
        let err = bind_named("SELECT :missing", DatabaseType::Mssql, &Map::new()).unwrap_err();
        assert!(err.contains(":missing"));
    }

    #[test]
    fn test_colon_not_followed_by_name_is_kept() {
        let bound = bind_named("SELECT 1 :=2, ':'", DatabaseType::MySql, &Map::new()).unwrap();
        assert_eq!(bound.sql, "SELECT 1 :=2, ':'");
    }

    #[test]
    fn test_non_ascii_text_survives() {
        let p = params(json!({"city": "Zürich"}));
        let bound =
            bind_named("SELECT 'Größe', :city AS ville", DatabaseType::Mssql, &p).unwrap();
        assert_eq!(bound.sql, "SELECT 'Größe', @P1 AS ville");
    }

    #[test]
    fn test_json_value_conversion() {
        assert_eq!(QueryParam::from(&json!(null)), QueryParam::Null);
        assert_eq!(QueryParam::from(&json!(true)), QueryParam::Bool(true));
        assert_eq!(QueryParam::from(&json!(2.5)), QueryParam::Float(2.5));
        assert_eq!(QueryParam::from(&json!([1, 2])), QueryParam::Json(json!([1, 2])));
    }
}
