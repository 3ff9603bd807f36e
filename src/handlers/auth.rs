//! Credential exchange: email and password in, user record out.

use crate::error::AppError;
use crate::identity::UserManager;
use crate::response;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let users = state
        .model
        .entities
        .iter()
        .find(|e| e.credentials.is_some())
        .ok_or_else(|| AppError::NotFound("no entity holds credentials".into()))?;
    let user = UserManager::authenticate(&state.pool, users, &req.email, &req.password)
        .await
        .inspect_err(|e| {
            if matches!(e, AppError::Unauthorized(_)) {
                tracing::info!(email = %req.email, "login rejected");
            }
        })?;
    Ok(response::ok(user))
}
