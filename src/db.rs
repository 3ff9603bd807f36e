//! Database bootstrap: create the target database when it is missing, open the pool, migrate.

use crate::config::resolve;
use crate::error::{AppError, ConfigError};
use crate::migration::apply_migrations;
use crate::schema::course_schema;
use crate::settings::Settings;
use crate::state::AppState;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;

/// Connect to the `postgres` maintenance database on the same server and create the target database if absent.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = split_database_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = PgConnectOptions::from_str(&admin_url).map_err(|e| ConfigError::Env {
        var: "DATABASE_URL",
        message: e.to_string(),
    })?;
    let mut conn: sqlx::PgConnection = opts.connect().await.map_err(AppError::Db)?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await
        .map_err(AppError::Db)?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await
            .map_err(AppError::Db)?;
    }
    Ok(())
}

/// Pool sized from settings.
pub async fn connect(settings: &Settings) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .map_err(AppError::Db)?;
    Ok(pool)
}

/// Everything a binary needs before serving: database created, schema migrated, model resolved.
pub async fn bootstrap(settings: &Settings) -> Result<AppState, AppError> {
    ensure_database_exists(&settings.database_url).await?;
    let pool = connect(settings).await?;
    let config = course_schema(&settings.schema);
    apply_migrations(&pool, &config).await?;
    let model = resolve(&config)?;
    tracing::info!(schema = %settings.schema, entities = model.entities.len(), "model resolved");
    Ok(AppState::new(pool, config, model))
}

/// Returns (url of the `postgres` database on the same server, target database name). Query parameters are kept.
fn split_database_url(url: &str) -> Result<(String, String), AppError> {
    let (without_query, query) = match url.split_once('?') {
        Some((u, q)) => (u, Some(q)),
        None => (url, None),
    };
    let scheme_end = without_query.find("://").map(|i| i + 3).unwrap_or(0);
    let path_start = without_query[scheme_end..]
        .find('/')
        .map(|i| scheme_end + i + 1)
        .ok_or_else(|| ConfigError::Env {
            var: "DATABASE_URL",
            message: "no database path".into(),
        })?;
    let db_name = without_query[path_start..].trim().to_string();
    let mut admin_url = format!("{}postgres", &without_query[..path_start]);
    if let Some(q) = query {
        admin_url.push('?');
        admin_url.push_str(q);
    }
    Ok((admin_url, db_name))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
