//! Router assembly: common routes at the root, API routes under `/api/v1`.

mod auth;
mod common;
mod config;
mod entity;

pub use auth::auth_routes;
pub use common::common_routes;
pub use config::config_routes;
pub use entity::entity_routes;

use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub const API_PREFIX: &str = "/api/v1";

/// Full application router with request tracing and a request body size limit.
pub fn app_router(state: AppState, body_limit: usize) -> Router {
    let api = Router::new()
        .merge(config_routes(state.clone()))
        .merge(auth_routes(state.clone()))
        .merge(entity_routes(state.clone()));
    Router::new()
        .merge(common_routes(state))
        .nest(API_PREFIX, api)
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
}
