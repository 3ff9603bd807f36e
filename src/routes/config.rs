//! Schema introspection routes.

use crate::handlers::config::get_config;
use crate::state::AppState;
use axum::{routing::get, Router};

/// GET /config/:kind for schemas, enums, tables, columns, indexes, relationships, api_entities.
pub fn config_routes(state: AppState) -> Router {
    Router::new()
        .route("/config/:kind", get(get_config))
        .with_state(state)
}
