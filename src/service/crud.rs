//! Generic CRUD execution against PostgreSQL.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::sql::{delete, insert, select_by_id, select_list, select_list_with_includes, update, IncludeSelect, PgBindValue, QueryBuf};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool};
use std::collections::HashMap;

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 1000;

pub struct CrudService;

impl CrudService {
    /// List rows with optional filters (exact match), limit (default 100, max 1000), offset (default 0).
    pub async fn list(
        pool: &PgPool,
        entity: &ResolvedEntity,
        filters: &[(String, Value)],
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Value>, AppError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = offset.unwrap_or(0);
        let q = select_list(entity, filters, Some(limit), Some(offset));
        Self::fetch_all(pool, &q).await
    }

    /// List rows with includes in a single query (scalar subqueries with json_agg/row_to_json). Returns rows with include keys already set (JSON).
    pub async fn list_with_includes(
        pool: &PgPool,
        entity: &ResolvedEntity,
        filters: &[(String, Value)],
        limit: Option<u32>,
        offset: Option<u32>,
        includes: &[IncludeSelect<'_>],
    ) -> Result<Vec<Value>, AppError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = offset.unwrap_or(0);
        let q = select_list_with_includes(entity, filters, Some(limit), Some(offset), includes);
        Self::fetch_all(pool, &q).await
    }

    /// Fetch one row by primary key. Returns JSON object or None.
    pub async fn read(
        pool: &PgPool,
        entity: &ResolvedEntity,
        id: &Value,
    ) -> Result<Option<Value>, AppError> {
        let mut q = select_by_id(entity);
        q.params.push(PgBindValue::from_json(id));
        Self::fetch_optional(pool, &q).await
    }

    /// Fetch one row by primary key with includes.
    pub async fn read_with_includes(
        pool: &PgPool,
        entity: &ResolvedEntity,
        id: &Value,
        includes: &[IncludeSelect<'_>],
    ) -> Result<Option<Value>, AppError> {
        let filters = [(entity.pk_columns[0].clone(), id.clone())];
        let q = select_list_with_includes(entity, &filters, Some(1), None, includes);
        Self::fetch_optional(pool, &q).await
    }

    /// Insert one row; body may include or omit PK (if has default). Returns created row.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        entity: &ResolvedEntity,
        body: &HashMap<String, Value>,
    ) -> Result<Value, AppError> {
        let include_pk = body.contains_key(&entity.pk_columns[0]);
        let q = insert(entity, body, include_pk);
        Self::fetch_optional(executor, &q)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    /// Update one row by id. Returns updated row, or None if no row has that id.
    pub async fn update<'e, E: PgExecutor<'e>>(
        executor: E,
        entity: &ResolvedEntity,
        id: &Value,
        body: &HashMap<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let q = update(entity, id, body);
        Self::fetch_optional(executor, &q).await
    }

    /// Delete one row by id; dependent rows go with it through ON DELETE CASCADE. Returns deleted row or None.
    pub async fn delete(
        pool: &PgPool,
        entity: &ResolvedEntity,
        id: &Value,
    ) -> Result<Option<Value>, AppError> {
        let mut q = delete(entity);
        q.params.push(PgBindValue::from_json(id));
        Self::fetch_optional(pool, &q).await
    }

    async fn fetch_optional<'e, E: PgExecutor<'e>>(executor: E, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p);
        }
        let row = query.fetch_optional(executor).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }

    async fn fetch_all<'e, E: PgExecutor<'e>>(executor: E, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p);
        }
        let rows = query.fetch_all(executor).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
