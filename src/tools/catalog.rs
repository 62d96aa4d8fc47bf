//! Tool catalog: static descriptors, argument validation and JSON schemas.
//!
//! The catalog is the discovery surface returned by `list_tools`. The same
//! descriptors validate incoming argument maps before dispatch: unknown
//! arguments and mistyped values are rejected, missing required arguments are
//! reported, and omitted optional arguments are filled with their defaults.

use serde_json::{Map, Value as JsonValue, json};

// =============================================================================
// Argument types
// =============================================================================

/// JSON type accepted for one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Integer,
    Boolean,
    Object,
    /// Array whose items are all objects.
    ObjectArray,
}

impl ArgType {
    pub fn schema_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::ObjectArray => "array",
        }
    }

    /// Check a JSON value against this type.
    pub fn check(self, value: &JsonValue) -> Result<(), String> {
        let ok = match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::ObjectArray => {
                let Some(items) = value.as_array() else {
                    return Err(format!("expected array, got {}", value_type_name(value)));
                };
                if let Some((i, item)) = items.iter().enumerate().find(|(_, v)| !v.is_object()) {
                    return Err(format!(
                        "expected object at index {}, got {}",
                        i,
                        value_type_name(item)
                    ));
                }
                true
            }
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "expected {}, got {}",
                self.schema_type(),
                value_type_name(value)
            ))
        }
    }
}

fn value_type_name(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_f64() => "number",
        JsonValue::Number(_) => "integer",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Declared default for an optional argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgDefault {
    Integer(i64),
    Boolean(bool),
    Str(&'static str),
    EmptyObject,
}

impl ArgDefault {
    pub fn to_json(self) -> JsonValue {
        match self {
            Self::Integer(i) => json!(i),
            Self::Boolean(b) => json!(b),
            Self::Str(s) => json!(s),
            Self::EmptyObject => json!({}),
        }
    }
}

/// One argument of a tool.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub arg_type: ArgType,
    pub description: &'static str,
    pub default: Option<ArgDefault>,
    /// Allowed string values; empty means unconstrained.
    pub allowed: &'static [&'static str],
    pub required: bool,
}

impl ArgSpec {
    const fn required(name: &'static str, arg_type: ArgType, description: &'static str) -> Self {
        Self {
            name,
            arg_type,
            description,
            default: None,
            allowed: &[],
            required: true,
        }
    }

    const fn optional(name: &'static str, arg_type: ArgType, description: &'static str) -> Self {
        Self {
            name,
            arg_type,
            description,
            default: None,
            allowed: &[],
            required: false,
        }
    }

    const fn with_default(mut self, default: ArgDefault) -> Self {
        self.default = Some(default);
        self
    }

    const fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }

    fn check(&self, value: &JsonValue) -> Result<(), String> {
        self.arg_type
            .check(value)
            .map_err(|e| format!("argument '{}': {}", self.name, e))?;
        if let (false, Some(s)) = (self.allowed.is_empty(), value.as_str()) {
            if !self.allowed.contains(&s) {
                return Err(format!(
                    "argument '{}': invalid value '{}', expected one of: {}",
                    self.name,
                    s,
                    self.allowed.join(", ")
                ));
            }
        }
        Ok(())
    }

    fn schema(&self) -> JsonValue {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(self.arg_type.schema_type()));
        prop.insert("description".into(), json!(self.description));
        if self.arg_type == ArgType::ObjectArray {
            prop.insert("items".into(), json!({ "type": "object" }));
        }
        if !self.allowed.is_empty() {
            prop.insert("enum".into(), json!(self.allowed));
        }
        if let Some(default) = self.default {
            prop.insert("default".into(), default.to_json());
        }
        JsonValue::Object(prop)
    }
}

// =============================================================================
// Tool descriptors
// =============================================================================

/// Name, description and arguments of one tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub args: &'static [ArgSpec],
}

impl ToolDescriptor {
    /// JSON schema of the argument object, as advertised to clients.
    pub fn input_schema(&self) -> Map<String, JsonValue> {
        let properties: Map<String, JsonValue> = self
            .args
            .iter()
            .map(|arg| (arg.name.to_string(), arg.schema()))
            .collect();
        let required: Vec<&str> = self
            .args
            .iter()
            .filter(|arg| arg.required)
            .map(|arg| arg.name)
            .collect();

        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), JsonValue::Object(properties));
        schema.insert("required".into(), json!(required));
        schema
    }

    /// Validate an argument map and fill in defaults.
    ///
    /// A `null` value for an optional argument counts as omitted.
    pub fn validate(
        &self,
        arguments: Option<Map<String, JsonValue>>,
    ) -> Result<Map<String, JsonValue>, String> {
        let mut arguments = arguments.unwrap_or_default();

        if let Some(unknown) = arguments
            .keys()
            .find(|key| !self.args.iter().any(|arg| arg.name == key.as_str()))
        {
            return Err(format!("unknown argument '{}'", unknown));
        }

        let mut validated = Map::new();
        for arg in self.args {
            match arguments.remove(arg.name) {
                Some(value) if !(value.is_null() && !arg.required) => {
                    arg.check(&value)?;
                    validated.insert(arg.name.to_string(), value);
                }
                _ if arg.required => {
                    return Err(format!("missing required argument '{}'", arg.name));
                }
                _ => {
                    if let Some(default) = arg.default {
                        validated.insert(arg.name.to_string(), default.to_json());
                    }
                }
            }
        }
        Ok(validated)
    }
}

use ArgType::{Boolean, Integer, Object, ObjectArray, String as Text};

/// Every tool the server exposes, in discovery order.
pub static TOOLS: &[ToolDescriptor] = &[
    ToolDescriptor {
        name: "execute_query",
        description: "Execute a SQL query against the SQL Server database",
        args: &[
            ArgSpec::required("query", Text, "SQL query to execute"),
            ArgSpec::optional("params", Object, "Parameters for parameterized queries")
                .with_default(ArgDefault::EmptyObject),
            ArgSpec::optional("limit", Integer, "Maximum number of rows to return")
                .with_default(ArgDefault::Integer(1000)),
        ],
    },
    ToolDescriptor {
        name: "get_schema",
        description: "Get database schema information including tables, columns, and relationships",
        args: &[
            ArgSpec::optional(
                "table_name",
                Text,
                "Specific table name (optional - if not provided, returns all tables)",
            ),
            ArgSpec::optional("include_columns", Boolean, "Include column details")
                .with_default(ArgDefault::Boolean(true)),
            ArgSpec::optional("include_indexes", Boolean, "Include index information")
                .with_default(ArgDefault::Boolean(false)),
        ],
    },
    ToolDescriptor {
        name: "get_table_info",
        description: "Get detailed information about a specific table including schema, indexes, and sample data",
        args: &[
            ArgSpec::required("table_name", Text, "Name of the table to inspect"),
            ArgSpec::optional("sample_rows", Integer, "Number of sample rows to return")
                .with_default(ArgDefault::Integer(5)),
        ],
    },
    ToolDescriptor {
        name: "explain_query",
        description: "Get the execution plan for a SQL query",
        args: &[ArgSpec::required("query", Text, "SQL query to explain")],
    },
    ToolDescriptor {
        name: "check_connection",
        description: "Test database connection and return connection status",
        args: &[],
    },
    ToolDescriptor {
        name: "get_table_stats",
        description: "Get statistics about table size, row count, and disk usage",
        args: &[ArgSpec::optional(
            "table_name",
            Text,
            "Table name (optional - if not provided, returns stats for all tables)",
        )],
    },
    ToolDescriptor {
        name: "search_tables",
        description: "Search for tables and columns by name or pattern",
        args: &[
            ArgSpec::required("search_term", Text, "Search term or pattern"),
            ArgSpec::optional(
                "search_type",
                Text,
                "Search type: 'table' or 'column' or 'both'",
            )
            .one_of(&["table", "column", "both"])
            .with_default(ArgDefault::Str("both")),
        ],
    },
    ToolDescriptor {
        name: "backup_table",
        description: "Create a backup copy of a table",
        args: &[
            ArgSpec::required("table_name", Text, "Source table name"),
            ArgSpec::optional(
                "backup_name",
                Text,
                "Backup table name (optional - auto-generated if not provided)",
            ),
        ],
    },
    ToolDescriptor {
        name: "insert_data",
        description: "Insert data into a table",
        args: &[
            ArgSpec::required("table_name", Text, "Target table name"),
            ArgSpec::required(
                "data",
                ObjectArray,
                "Array of objects representing rows to insert",
            ),
            ArgSpec::optional(
                "on_conflict",
                Text,
                "How to handle conflicts: 'ignore' or 'replace'",
            )
            .one_of(&["ignore", "replace"])
            .with_default(ArgDefault::Str("ignore")),
        ],
    },
];

/// Look up a descriptor by tool name.
pub fn find(name: &str) -> Option<&'static ToolDescriptor> {
    TOOLS.iter().find(|tool| tool.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: JsonValue) -> Option<Map<String, JsonValue>> {
        match value {
            JsonValue::Object(map) => Some(map),
            _ => None,
        }
    }

    #[test]
    fn test_catalog_has_nine_unique_tools() {
        assert_eq!(TOOLS.len(), 9);
        let mut names: Vec<&str> = TOOLS.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn test_execute_query_schema() {
        let schema = find("execute_query").unwrap().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["properties"]["limit"]["default"], 1000);
        assert_eq!(schema["properties"]["params"]["default"], json!({}));
    }

    #[test]
    fn test_insert_data_schema_lists_enum_and_items() {
        let schema = find("insert_data").unwrap().input_schema();
        assert_eq!(schema["required"], json!(["table_name", "data"]));
        assert_eq!(schema["properties"]["data"]["items"]["type"], "object");
        assert_eq!(
            schema["properties"]["on_conflict"]["enum"],
            json!(["ignore", "replace"])
        );
    }

    #[test]
    fn test_check_connection_takes_no_arguments() {
        let schema = find("check_connection").unwrap().input_schema();
        assert_eq!(schema["properties"], json!({}));
        assert_eq!(schema["required"], json!([]));
    }

    #[test]
    fn test_validate_fills_defaults() {
        let tool = find("get_schema").unwrap();
        let filled = tool.validate(None).unwrap();
        assert_eq!(filled["include_columns"], true);
        assert_eq!(filled["include_indexes"], false);
        assert!(!filled.contains_key("table_name"));
    }

    #[test]
    fn test_validate_keeps_supplied_values() {
        let tool = find("execute_query").unwrap();
        let filled = tool
            .validate(args(json!({"query": "SELECT 1", "limit": 5})))
            .unwrap();
        assert_eq!(filled["limit"], 5);
        assert_eq!(filled["params"], json!({}));
    }

    #[test]
    fn test_validate_rejects_missing_required() {
        let err = find("explain_query").unwrap().validate(None).unwrap_err();
        assert_eq!(err, "missing required argument 'query'");
    }

    #[test]
    fn test_validate_rejects_unknown_argument() {
        let err = find("check_connection")
            .unwrap()
            .validate(args(json!({"verbose": true})))
            .unwrap_err();
        assert_eq!(err, "unknown argument 'verbose'");
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let err = find("execute_query")
            .unwrap()
            .validate(args(json!({"query": "SELECT 1", "limit": "ten"})))
            .unwrap_err();
        assert_eq!(err, "argument 'limit': expected integer, got string");
    }

    #[test]
    fn test_validate_rejects_float_for_integer() {
        let err = find("get_table_info")
            .unwrap()
            .validate(args(json!({"table_name": "t", "sample_rows": 2.5})))
            .unwrap_err();
        assert!(err.contains("expected integer, got number"));
    }

    #[test]
    fn test_validate_rejects_value_outside_enum() {
        let err = find("search_tables")
            .unwrap()
            .validate(args(json!({"search_term": "x", "search_type": "view"})))
            .unwrap_err();
        assert!(err.contains("expected one of: table, column, both"));
    }

    #[test]
    fn test_validate_rejects_non_object_rows() {
        let err = find("insert_data")
            .unwrap()
            .validate(args(json!({"table_name": "t", "data": [{"a": 1}, 2]})))
            .unwrap_err();
        assert!(err.contains("expected object at index 1"));
    }

    #[test]
    fn test_null_optional_counts_as_omitted() {
        let filled = find("search_tables")
            .unwrap()
            .validate(args(json!({"search_term": "x", "search_type": null})))
            .unwrap();
        assert_eq!(filled["search_type"], "both");
    }

    #[test]
    fn test_null_required_is_missing() {
        let err = find("backup_table")
            .unwrap()
            .validate(args(json!({"table_name": null})))
            .unwrap_err();
        assert_eq!(err, "missing required argument 'table_name'");
    }
}
