//! Read-only introspection of the declared schema, one config kind at a time.

use crate::error::AppError;
use crate::response;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

pub async fn get_config(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let out = state
        .config
        .kind_as_json(&kind)
        .ok_or_else(|| AppError::BadRequest(format!("unknown config kind: {}", kind)))?;
    Ok(response::many(out))
}
