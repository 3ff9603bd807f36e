//! Declarative schema types: schemas, enums, tables, columns, indexes, relationships and API entities.
//! Serialized as-is by the introspection routes.

use serde::Serialize;
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize)]
pub struct SchemaConfig {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// A PostgreSQL enum type. `schema_id` falls back to the first declared schema.
#[derive(Clone, Debug, Serialize)]
pub struct EnumConfig {
    pub id: String,
    pub schema_id: Option<String>,
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TableCheck {
    pub name: String,
    pub expression: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum PrimaryKeyConfig {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKeyConfig {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKeyConfig::Single(s) => vec![s.as_str()],
            PrimaryKeyConfig::Composite(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TableConfig {
    pub id: String,
    pub schema_id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub primary_key: PrimaryKeyConfig,
    /// Each entry is one UNIQUE constraint over the listed columns.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unique: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub check: Vec<TableCheck>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ColumnTypeConfig {
    Simple(String),
    Parameterized { name: String, params: Vec<u32> },
}

impl ColumnTypeConfig {
    /// Base type name without parameters (e.g. "numeric" for numeric(10,2)).
    pub fn base_name(&self) -> &str {
        match self {
            ColumnTypeConfig::Simple(s) => s.as_str(),
            ColumnTypeConfig::Parameterized { name, .. } => name.as_str(),
        }
    }

    /// Full DDL type, parameters included.
    pub fn ddl(&self) -> String {
        match self {
            ColumnTypeConfig::Simple(s) => s.clone(),
            ColumnTypeConfig::Parameterized { name, params } if params.is_empty() => name.clone(),
            ColumnTypeConfig::Parameterized { name, params } => {
                let p: Vec<String> = params.iter().map(u32::to_string).collect();
                format!("{}({})", name, p.join(", "))
            }
        }
    }
}

/// Column default: a SQL literal (`'student'`, `false`) or an expression evaluated per row (`NOW()`).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDefaultConfig {
    Literal(String),
    Expression(String),
}

impl ColumnDefaultConfig {
    pub fn sql(&self) -> &str {
        match self {
            ColumnDefaultConfig::Literal(s) | ColumnDefaultConfig::Expression(s) => s,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ColumnConfig {
    pub id: String,
    pub table_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnTypeConfig,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<ColumnDefaultConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// B-tree index in the schema of its table.
#[derive(Clone, Debug, Serialize)]
pub struct IndexConfig {
    pub id: String,
    pub table_id: String,
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

/// Foreign key from one column to another. `name` defaults to `id` as the constraint name.
#[derive(Clone, Debug, Serialize)]
pub struct RelationshipConfig {
    pub id: String,
    pub from_schema_id: String,
    pub from_table_id: String,
    pub from_column_id: String,
    pub to_schema_id: String,
    pub to_table_id: String,
    pub to_column_id: String,
    /// Referential action: "CASCADE", "RESTRICT", "SET NULL", "NO ACTION" (the default).
    pub on_delete: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RelationshipConfig {
    pub fn cascades_on_delete(&self) -> bool {
        self.on_delete
            .as_deref()
            .map(|a| a.eq_ignore_ascii_case("cascade"))
            .unwrap_or(false)
    }
}

/// JSON shape a column accepts in request bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// JSON integer, or a string holding one.
    Integer,
    /// JSON number, or a string holding a finite decimal.
    Decimal,
    Boolean,
    /// `YYYY-MM-DD` string.
    Date,
    /// RFC 3339 string.
    Timestamp,
    Text,
    /// Any JSON value.
    Json,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ValidationRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ValueKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

/// Marks an entity as holding login credentials: the login column is normalized as an email
/// and the password column is hashed before any write.
#[derive(Clone, Debug, Serialize)]
pub struct CredentialConfig {
    pub login_column: String,
    pub password_column: String,
    /// Boolean column; accounts with it false cannot log in.
    pub active_column: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ApiEntityConfig {
    pub entity_id: String,
    pub path_segment: String,
    pub operations: Vec<String>,
    /// Column names that must never be exposed in API responses (e.g. password hashes).
    pub sensitive_columns: Vec<String>,
    /// Column names ignored in create/update bodies (set by the database or server only).
    pub read_only_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialConfig>,
    pub validation: HashMap<String, ValidationRule>,
}

/// All config kinds in one struct.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FullConfig {
    pub schemas: Vec<SchemaConfig>,
    pub enums: Vec<EnumConfig>,
    pub tables: Vec<TableConfig>,
    pub columns: Vec<ColumnConfig>,
    pub indexes: Vec<IndexConfig>,
    pub relationships: Vec<RelationshipConfig>,
    pub api_entities: Vec<ApiEntityConfig>,
}

impl FullConfig {
    /// Config records of one kind as JSON values, for introspection.
    pub fn kind_as_json(&self, kind: &str) -> Option<Vec<serde_json::Value>> {
        fn to_values<T: Serialize>(items: &[T]) -> Vec<serde_json::Value> {
            items
                .iter()
                .filter_map(|i| serde_json::to_value(i).ok())
                .collect()
        }
        Some(match kind {
            "schemas" => to_values(&self.schemas),
            "enums" => to_values(&self.enums),
            "tables" => to_values(&self.tables),
            "columns" => to_values(&self.columns),
            "indexes" => to_values(&self.indexes),
            "relationships" => to_values(&self.relationships),
            "api_entities" => to_values(&self.api_entities),
            _ => return None,
        })
    }
}
