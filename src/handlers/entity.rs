//! Entity CRUD handlers: list, create, read, replace, update, delete.

use crate::config::{PkType, ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::identity::apply_credentials;
use crate::response;
use crate::service::{CrudService, RequestValidator};
use crate::sql::IncludeSelect;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

fn parse_id(id_str: &str, pk_type: &PkType) -> Result<Value, AppError> {
    Ok(match pk_type {
        PkType::BigInt | PkType::Int => {
            let n: i64 = id_str.parse().map_err(|_| AppError::BadRequest(format!("invalid id: {}", id_str)))?;
            Value::Number(n.into())
        }
        PkType::Text => Value::String(id_str.to_string()),
    })
}

fn body_to_map(value: Value) -> Result<HashMap<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m.into_iter().collect()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn entity<'a>(state: &'a AppState, path_segment: &str, operation: &str) -> Result<&'a ResolvedEntity, AppError> {
    let entity = state
        .model
        .entity_by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(path_segment.to_string()))?;
    if !entity.allows(operation) {
        return Err(AppError::BadRequest(format!("{} not allowed on {}", operation, path_segment)));
    }
    Ok(entity)
}

/// Request body with read-only columns dropped.
fn writable_body(entity: &ResolvedEntity, body: Value) -> Result<HashMap<String, Value>, AppError> {
    let mut body = body_to_map(body)?;
    body.retain(|k, _| !entity.read_only_columns.contains(k));
    Ok(body)
}

/// Normalize the login email and hash the password for entities holding credentials.
fn secure_credentials(
    entity: &ResolvedEntity,
    body: &mut HashMap<String, Value>,
    require_login: bool,
) -> Result<(), AppError> {
    match &entity.credentials {
        Some(spec) => apply_credentials(body, spec, require_login),
        None => Ok(()),
    }
}

/// Parse `include=a,b` into joins against related entities. Unknown names are rejected.
fn parse_includes<'a>(
    model: &'a ResolvedModel,
    entity: &'a ResolvedEntity,
    raw: Option<&str>,
) -> Result<Vec<IncludeSelect<'a>>, AppError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let spec = entity
            .include(name)
            .ok_or_else(|| AppError::BadRequest(format!("unknown include: {}", name)))?;
        let related = model
            .entity_by_path(&spec.related_path_segment)
            .ok_or_else(|| AppError::BadRequest(format!("unknown include: {}", name)))?;
        out.push(IncludeSelect {
            name: &spec.name,
            direction: spec.direction.clone(),
            related,
            our_key: &spec.our_key_column,
            their_key: &spec.their_key_column,
        });
    }
    Ok(out)
}

pub async fn list(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, "read")?;

    let mut limit: Option<u32> = None;
    let mut offset: Option<u32> = None;
    let mut filters: Vec<(String, Value)> = Vec::new();

    for (k, v) in &params {
        match k.as_str() {
            "limit" => {
                limit = Some(v.parse().map_err(|_| AppError::BadRequest(format!("invalid limit: {}", v)))?);
            }
            "offset" => {
                offset = Some(v.parse().map_err(|_| AppError::BadRequest(format!("invalid offset: {}", v)))?);
            }
            "include" => {}
            _ => {
                // Values stay text; the placeholder cast converts them to the column type.
                if entity.column(k).is_some() && !entity.sensitive_columns.contains(k) {
                    filters.push((k.clone(), Value::String(v.clone())));
                }
            }
        }
    }
    filters.sort_by(|a, b| a.0.cmp(&b.0));

    let includes = parse_includes(&state.model, entity, params.get("include").map(String::as_str))?;
    let rows = if includes.is_empty() {
        CrudService::list(&state.pool, entity, &filters, limit, offset).await?
    } else {
        CrudService::list_with_includes(&state.pool, entity, &filters, limit, offset, &includes).await?
    };
    Ok(response::many(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, "create")?;
    let mut body = writable_body(entity, body)?;
    RequestValidator::validate(&body, &entity.validation)?;
    secure_credentials(entity, &mut body, true)?;
    let row = CrudService::create(&state.pool, entity, &body).await?;
    tracing::info!(entity = %entity.path_segment, id = %row[&entity.pk_columns[0]], "created");
    Ok(response::created(row))
}

pub async fn read(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, "read")?;
    let id = parse_id(&id_str, &entity.pk_type)?;
    let includes = parse_includes(&state.model, entity, params.get("include").map(String::as_str))?;
    let row = if includes.is_empty() {
        CrudService::read(&state.pool, entity, &id).await?
    } else {
        CrudService::read_with_includes(&state.pool, entity, &id, &includes).await?
    };
    let row = row.ok_or_else(|| AppError::NotFound(format!("{}/{}", path_segment, id_str)))?;
    Ok(response::ok(row))
}

/// PUT: every required field must be present.
pub async fn replace(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, "update")?;
    let id = parse_id(&id_str, &entity.pk_type)?;
    let mut body = writable_body(entity, body)?;
    RequestValidator::validate(&body, &entity.validation)?;
    secure_credentials(entity, &mut body, false)?;
    let row = CrudService::update(&state.pool, entity, &id, &body)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{}/{}", path_segment, id_str)))?;
    Ok(response::ok(row))
}

/// PATCH: only the fields present are validated and written.
pub async fn update(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, "update")?;
    let id = parse_id(&id_str, &entity.pk_type)?;
    let mut body = writable_body(entity, body)?;
    RequestValidator::validate_partial(&body, &entity.validation)?;
    secure_credentials(entity, &mut body, false)?;
    let row = CrudService::update(&state.pool, entity, &id, &body)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{}/{}", path_segment, id_str)))?;
    Ok(response::ok(row))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let entity = entity(&state, &path_segment, "delete")?;
    let id = parse_id(&id_str, &entity.pk_type)?;
    CrudService::delete(&state.pool, entity, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{}/{}", path_segment, id_str)))?;
    tracing::info!(
        entity = %entity.path_segment,
        id = %id,
        cascaded = ?state.model.cascade_closure(&entity.path_segment),
        "deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids() {
        assert_eq!(parse_id("42", &PkType::BigInt).unwrap(), Value::from(42));
        assert!(matches!(parse_id("abc", &PkType::BigInt), Err(AppError::BadRequest(_))));
        assert_eq!(parse_id("abc", &PkType::Text).unwrap(), Value::from("abc"));
    }

    #[test]
    fn body_must_be_object() {
        assert!(matches!(body_to_map(Value::from(1)), Err(AppError::BadRequest(_))));
        assert!(body_to_map(serde_json::json!({"a": 1})).is_ok());
    }
}
