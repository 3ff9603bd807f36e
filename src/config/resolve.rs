//! Resolve validated config into the runtime entity model.

use crate::config::resolved::{
    ColumnInfo, CredentialSpec, IncludeDirection, IncludeSpec, PkType, ResolvedEntity, ResolvedModel,
};
use crate::config::types::*;
use crate::config::{default_schema_id, validate, FullConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

/// Audit columns added to every table: (name, nullable, has_default).
pub(crate) const AUDIT_COLUMNS: &[(&str, bool, bool)] = &[("created_at", false, true), ("updated_at", false, true)];

/// Build resolved model from full config. Validates first.
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;
    let default_sid = default_schema_id(config)?;

    let schemas_by_id: HashMap<_, _> = config.schemas.iter().map(|s| (s.id.as_str(), s)).collect();
    let tables_by_id: HashMap<_, _> = config.tables.iter().map(|t| (t.id.as_str(), t)).collect();
    let columns_by_table: HashMap<_, Vec<&ColumnConfig>> = config
        .columns
        .iter()
        .fold(HashMap::new(), |mut m, c| {
            m.entry(c.table_id.as_str()).or_default().push(c);
            m
        });
    let column_id_to_name: HashMap<&str, &str> = config.columns.iter().map(|c| (c.id.as_str(), c.name.as_str())).collect();
    let table_id_to_path: HashMap<&str, &str> = config
        .api_entities
        .iter()
        .map(|api| (api.entity_id.as_str(), api.path_segment.as_str()))
        .collect();

    let mut entities = Vec::new();
    let mut entity_by_path = HashMap::new();

    for api in &config.api_entities {
        let table = tables_by_id
            .get(api.entity_id.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "table",
                id: api.entity_id.clone(),
            })?;
        let table_sid = table.schema_id.as_deref().unwrap_or(default_sid);
        let schema = schemas_by_id
            .get(table_sid)
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "schema",
                id: table_sid.to_string(),
            })?;
        let table_columns = columns_by_table.get(table.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);

        let pk_names: Vec<String> = table.primary_key.columns().into_iter().map(String::from).collect();
        let pk_col = table_columns
            .iter()
            .find(|c| c.name == pk_names[0])
            .ok_or_else(|| ConfigError::InvalidPrimaryKey {
                table_id: table.id.clone(),
                column: pk_names[0].clone(),
            })?;
        let pk_type = infer_pk_type(pk_col);

        let mut columns: Vec<ColumnInfo> = table_columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                pk_type: if pk_names.contains(&c.name) { Some(pk_type.clone()) } else { None },
                nullable: c.nullable,
                has_default: c.default.is_some() || is_serial(&c.type_),
                pg_type: column_pg_type_name(&c.type_),
            })
            .collect();

        let config_col_names: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
        let mut read_only_columns: HashSet<String> = api.read_only_columns.iter().cloned().collect();
        for &(name, nullable, has_default) in AUDIT_COLUMNS {
            if !config_col_names.contains(name) {
                columns.push(ColumnInfo {
                    name: name.to_string(),
                    pk_type: None,
                    nullable,
                    has_default,
                    pg_type: Some("timestamptz".into()),
                });
            }
            read_only_columns.insert(name.to_string());
        }
        read_only_columns.extend(pk_names.iter().cloned());

        let mut validation = api.validation.clone();
        for c in &columns {
            if let Some(kind) = c.pg_type.as_deref().map(value_kind) {
                validation.entry(c.name.clone()).or_default().kind = Some(kind);
            }
        }

        let includes = build_includes_for_table(
            &table.id,
            &config.relationships,
            &column_id_to_name,
            &table_id_to_path,
        );
        let cascades_to = config
            .relationships
            .iter()
            .filter(|r| r.to_table_id == table.id && r.cascades_on_delete())
            .filter_map(|r| table_id_to_path.get(r.from_table_id.as_str()).map(|p| p.to_string()))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let entity = ResolvedEntity {
            table_id: table.id.clone(),
            schema_name: schema.name.clone(),
            table_name: table.name.clone(),
            path_segment: api.path_segment.clone(),
            pk_columns: pk_names,
            pk_type,
            columns,
            operations: api.operations.clone(),
            sensitive_columns: api.sensitive_columns.iter().cloned().collect(),
            read_only_columns,
            includes,
            validation,
            credentials: api.credentials.as_ref().map(|c| CredentialSpec {
                login_column: c.login_column.clone(),
                password_column: c.password_column.clone(),
                active_column: c.active_column.clone(),
            }),
            cascades_to,
        };
        entity_by_path.insert(api.path_segment.clone(), entity.clone());
        entities.push(entity);
    }

    Ok(ResolvedModel {
        entities,
        entity_by_path,
    })
}

fn build_includes_for_table(
    our_table_id: &str,
    relationships: &[RelationshipConfig],
    column_id_to_name: &HashMap<&str, &str>,
    table_id_to_path: &HashMap<&str, &str>,
) -> Vec<IncludeSpec> {
    let mut includes = Vec::new();
    for rel in relationships {
        let from_col = column_id_to_name.get(rel.from_column_id.as_str()).map(|s| s.to_string());
        let to_col = column_id_to_name.get(rel.to_column_id.as_str()).map(|s| s.to_string());
        let from_path = table_id_to_path.get(rel.from_table_id.as_str()).map(|s| s.to_string());
        let to_path = table_id_to_path.get(rel.to_table_id.as_str()).map(|s| s.to_string());
        if let (Some(our_key), Some(their_key), Some(related_path)) = (from_col.clone(), to_col.clone(), to_path) {
            if rel.from_table_id == our_table_id {
                let name = our_key.strip_suffix("_id").unwrap_or(&our_key).to_string();
                includes.push(IncludeSpec {
                    name,
                    direction: IncludeDirection::ToOne,
                    related_path_segment: related_path,
                    our_key_column: our_key,
                    their_key_column: their_key,
                });
            }
        }
        if let (Some(our_key), Some(their_key), Some(related_path)) = (to_col, from_col, from_path) {
            if rel.to_table_id == our_table_id {
                includes.push(IncludeSpec {
                    name: related_path.clone(),
                    direction: IncludeDirection::ToMany,
                    related_path_segment: related_path,
                    our_key_column: our_key,
                    their_key_column: their_key,
                });
            }
        }
    }
    includes
}

fn is_serial(ty: &ColumnTypeConfig) -> bool {
    ty.base_name().to_lowercase().ends_with("serial")
}

/// Type used in `$n::type` casts so JSON-derived parameters bind to any column type.
fn column_pg_type_name(ty: &ColumnTypeConfig) -> Option<String> {
    let name = ty.base_name();
    let lower = name.to_lowercase();
    let cast = match lower.as_str() {
        "bigserial" => "bigint",
        "serial" => "integer",
        "smallserial" => "smallint",
        "timestamp with time zone" => "timestamptz",
        "timestamp without time zone" => "timestamp",
        "character varying" => "varchar",
        _ if name.contains('.') => return Some(name.to_string()),
        _ if lower.is_empty() => return None,
        other => other,
    };
    Some(cast.to_string())
}

/// Request-body shape for a cast type. Enums and character types take strings.
fn value_kind(pg_type: &str) -> ValueKind {
    match pg_type {
        "smallint" | "integer" | "int" | "int2" | "int4" | "bigint" | "int8" => ValueKind::Integer,
        "numeric" | "decimal" | "real" | "float4" | "double precision" | "float8" => ValueKind::Decimal,
        "boolean" | "bool" => ValueKind::Boolean,
        "date" => ValueKind::Date,
        "timestamptz" | "timestamp" => ValueKind::Timestamp,
        "json" | "jsonb" => ValueKind::Json,
        _ => ValueKind::Text,
    }
}

fn infer_pk_type(col: &ColumnConfig) -> PkType {
    let type_lower = col.type_.base_name().to_lowercase();
    if type_lower.contains("bigserial") || type_lower.contains("bigint") {
        PkType::BigInt
    } else if type_lower.contains("serial") || type_lower.contains("int") {
        PkType::Int
    } else {
        PkType::Text
    }
}
