//! Authentication routes.

use crate::handlers::auth::login;
use crate::state::AppState;
use axum::{routing::post, Router};

pub fn auth_routes(state: AppState) -> Router {
    Router::new().route("/auth/login", post(login)).with_state(state)
}
