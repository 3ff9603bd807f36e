//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from resolved entity.

use crate::config::{IncludeDirection, ResolvedEntity};
use crate::sql::params::PgBindValue;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Describes one include for single-query list: name, direction, related entity, our key column, their key column.
pub struct IncludeSelect<'a> {
    pub name: &'a str,
    pub direction: IncludeDirection,
    pub related: &'a ResolvedEntity,
    pub our_key: &'a str,
    pub their_key: &'a str,
}

/// Quote identifier for PostgreSQL (safe: only from config).
pub(crate) fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub(crate) fn qualified_table(entity: &ResolvedEntity) -> String {
    format!("{}.{}", quoted(&entity.schema_name), quoted(&entity.table_name))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: PgBindValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

/// Bind value for a column, converted according to its type.
fn column_param(entity: &ResolvedEntity, column: &str, v: &Value) -> PgBindValue {
    PgBindValue::for_column(v, entity.column(column).and_then(|c| c.pg_type.as_deref()))
}

/// `$n::type` when the column has a known type, else `$n`.
fn placeholder(entity: &ResolvedEntity, column: &str, param_num: u32) -> String {
    entity
        .column(column)
        .and_then(|c| c.pg_type.as_deref())
        .map(|t| format!("${}::{}", param_num, t))
        .unwrap_or_else(|| format!("${}", param_num))
}

/// Selected expression for one column: custom enums and numerics as text so they decode as strings.
fn select_expr(prefix: Option<&str>, name: &str, pg_type: Option<&str>) -> String {
    let col = match prefix {
        Some(p) => format!("{}.{}", p, quoted(name)),
        None => quoted(name),
    };
    let pg_type = pg_type.unwrap_or("");
    if pg_type.contains('.') || pg_type == "numeric" {
        format!("{}::text AS {}", col, quoted(name))
    } else if prefix.is_some() {
        format!("{} AS {}", col, quoted(name))
    } else {
        col
    }
}

/// SELECT list of every non-sensitive column.
fn select_column_list(entity: &ResolvedEntity, prefix: Option<&str>) -> String {
    entity
        .columns
        .iter()
        .filter(|c| !entity.sensitive_columns.contains(&c.name))
        .map(|c| select_expr(prefix, &c.name, c.pg_type.as_deref()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn where_clause(q: &mut QueryBuf, entity: &ResolvedEntity, filters: &[(String, Value)], prefix: Option<&str>) -> String {
    let col_names: HashSet<&str> = entity.columns.iter().map(|c| c.name.as_str()).collect();
    let mut where_parts = Vec::new();
    for (col, val) in filters {
        if !col_names.contains(col.as_str()) || entity.sensitive_columns.contains(col) {
            continue;
        }
        let param_num = q.push_param(PgBindValue::from_json(val));
        let lhs = match prefix {
            Some(p) => format!("{}.{}", p, quoted(col)),
            None => quoted(col),
        };
        where_parts.push(format!("{} = {}", lhs, placeholder(entity, col, param_num)));
    }
    if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    }
}

/// SELECT by primary key (single column PK only). Caller adds id as sole param.
pub fn select_by_id(entity: &ResolvedEntity) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = &entity.pk_columns[0];
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_column_list(entity, None),
        qualified_table(entity),
        quoted(pk),
        placeholder(entity, pk, 1)
    );
    q
}

/// SELECT list with includes in a single query: main table aliased as "main", each include as a scalar subquery (json_agg for to_many, row_to_json for to_one).
pub fn select_list_with_includes(
    entity: &ResolvedEntity,
    filters: &[(String, Value)],
    limit: Option<u32>,
    offset: Option<u32>,
    includes: &[IncludeSelect<'_>],
) -> QueryBuf {
    const MAIN_ALIAS: &str = "main";
    let mut q = QueryBuf::new();
    let pk = &entity.pk_columns[0];

    let mut select_parts = vec![select_column_list(entity, Some(MAIN_ALIAS))];
    for inc in includes {
        let rel_cols = select_column_list(inc.related, None);
        let sub_from = format!(
            "{} WHERE {} = {}.{}",
            qualified_table(inc.related),
            quoted(inc.their_key),
            MAIN_ALIAS,
            quoted(inc.our_key)
        );
        let subquery = match inc.direction {
            IncludeDirection::ToOne => format!(
                "(SELECT row_to_json(sub) FROM (SELECT {} FROM {}) sub)",
                rel_cols, sub_from
            ),
            IncludeDirection::ToMany => format!(
                "(SELECT COALESCE(json_agg(row_to_json(sub) ORDER BY sub.\"id\"), '[]'::json) FROM (SELECT {} FROM {}) sub)",
                rel_cols, sub_from
            ),
        };
        select_parts.push(format!("{} AS {}", subquery, quoted(inc.name)));
    }

    let where_clause = where_clause(&mut q, entity, filters, Some(MAIN_ALIAS));
    let order_clause = format!(" ORDER BY {}.{}", MAIN_ALIAS, quoted(pk));
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n.min(1000))).unwrap_or_default();
    let offset_clause = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();

    q.sql = format!(
        "SELECT {} FROM {} {}{}{}{}{}",
        select_parts.join(", "),
        qualified_table(entity),
        MAIN_ALIAS,
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

/// SELECT list with optional filters (exact match per column), ORDER BY pk, optional LIMIT/OFFSET.
/// filters: only (col, value) where col is in entity.columns; params bound in filter order.
pub fn select_list(
    entity: &ResolvedEntity,
    filters: &[(String, Value)],
    limit: Option<u32>,
    offset: Option<u32>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = &entity.pk_columns[0];
    let where_clause = where_clause(&mut q, entity, filters, None);
    let order_clause = format!(" ORDER BY {}", quoted(pk));
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n.min(1000))).unwrap_or_default();
    let offset_clause = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        select_column_list(entity, None),
        qualified_table(entity),
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

/// INSERT: columns and placeholders from entity; values from body. Excludes PK unless `include_pk`.
/// Omits columns with DB default when body does not provide a value (so DB uses default).
pub fn insert(entity: &ResolvedEntity, body: &HashMap<String, Value>, include_pk: bool) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        if c.pk_type.is_some() && !include_pk {
            continue;
        }
        let val = body.get(&c.name);
        if val.is_none() && c.has_default {
            continue;
        }
        let param_num = q.push_param(column_param(entity, &c.name, val.unwrap_or(&Value::Null)));
        cols.push(quoted(&c.name));
        placeholders.push(placeholder(entity, &c.name, param_num));
    }
    let returning = select_column_list(entity, None);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", qualified_table(entity), returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            qualified_table(entity),
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET only columns present in body (and in entity columns). Refreshes updated_at.
/// Columns are set in entity column order so the statement is deterministic.
pub fn update(entity: &ResolvedEntity, id: &Value, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(entity);
    let pk = &entity.pk_columns[0];
    let mut sets = Vec::new();
    for c in &entity.columns {
        if c.name == *pk || c.name == "updated_at" {
            continue;
        }
        let Some(v) = body.get(&c.name) else { continue };
        let param_num = q.push_param(column_param(entity, &c.name, v));
        sets.push(format!("{} = {}", quoted(&c.name), placeholder(entity, &c.name, param_num)));
    }
    if sets.is_empty() {
        q.params.clear();
        q.params.push(PgBindValue::from_json(id));
        q.sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            select_column_list(entity, None),
            table,
            quoted(pk),
            placeholder(entity, pk, 1)
        );
        return q;
    }
    if entity.column("updated_at").is_some() {
        sets.push(format!("{} = NOW()", quoted("updated_at")));
    }
    let id_param = q.push_param(PgBindValue::from_json(id));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        table,
        sets.join(", "),
        quoted(pk),
        placeholder(entity, pk, id_param),
        select_column_list(entity, None)
    );
    q
}

/// DELETE by id. Caller binds the id as sole param.
pub fn delete(entity: &ResolvedEntity) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = &entity.pk_columns[0];
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        qualified_table(entity),
        quoted(pk),
        placeholder(entity, pk, 1),
        select_column_list(entity, None)
    );
    q
}
