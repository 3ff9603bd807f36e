//! Shared application state for all routes. Model and schema are fixed at startup.

use crate::config::{FullConfig, ResolvedModel};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub model: Arc<ResolvedModel>,
    /// Declared schema, served by the introspection routes.
    pub config: Arc<FullConfig>,
}

impl AppState {
    pub fn new(pool: PgPool, config: FullConfig, model: ResolvedModel) -> Self {
        AppState {
            pool,
            model: Arc::new(model),
            config: Arc::new(config),
        }
    }
}
