//! Apply config to the database: DDL for schemas, enums, tables, indexes, and foreign keys.
//! Statements are ordered by PostgreSQL dependencies and are safe to re-run against an existing database.

use crate::config::resolve::AUDIT_COLUMNS;
use crate::config::types::*;
use crate::config::{default_schema_id, validate, FullConfig};
use crate::error::{AppError, ConfigError};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn missing(kind: &'static str, id: &str) -> ConfigError {
    ConfigError::MissingReference {
        kind,
        id: id.to_string(),
    }
}

/// DDL derived from a config. `statements` run in one transaction; `comments` are applied afterwards and may fail.
#[derive(Debug, Default)]
pub struct MigrationPlan {
    pub statements: Vec<String>,
    pub comments: Vec<String>,
}

/// Build the DDL for a config: CREATE SCHEMA, CREATE TYPE, CREATE TABLE, CREATE INDEX, then foreign keys.
pub fn plan_migrations(config: &FullConfig) -> Result<MigrationPlan, ConfigError> {
    validate(config)?;
    let default_sid = default_schema_id(config)?;

    let schemas_by_id: HashMap<_, _> = config.schemas.iter().map(|s| (s.id.as_str(), s)).collect();
    let tables_by_id: HashMap<_, _> = config.tables.iter().map(|t| (t.id.as_str(), t)).collect();
    let columns_by_id: HashMap<_, _> = config.columns.iter().map(|c| (c.id.as_str(), c)).collect();
    let columns_by_table: HashMap<_, Vec<&ColumnConfig>> = config.columns.iter().fold(
        HashMap::new(),
        |mut m, c| {
            m.entry(c.table_id.as_str()).or_default().push(c);
            m
        },
    );
    let schema_name = |sid: Option<&str>| -> Result<String, ConfigError> {
        let sid = sid.unwrap_or(default_sid);
        schemas_by_id
            .get(sid)
            .map(|s| quote(&s.name))
            .ok_or_else(|| missing("schema", sid))
    };
    let table_name = |table_id: &str| -> Result<String, ConfigError> {
        let table = tables_by_id.get(table_id).ok_or_else(|| missing("table", table_id))?;
        Ok(format!("{}.{}", schema_name(table.schema_id.as_deref())?, quote(&table.name)))
    };

    let mut plan = MigrationPlan::default();

    for s in &config.schemas {
        let name = quote(&s.name);
        plan.statements.push(format!("CREATE SCHEMA IF NOT EXISTS {}", name));
        if let Some(c) = &s.comment {
            plan.comments.push(format!("COMMENT ON SCHEMA {} IS {}", name, literal(c)));
        }
    }

    // CREATE TYPE has no IF NOT EXISTS.
    for e in &config.enums {
        let values: Vec<String> = e.values.iter().map(|v| literal(v)).collect();
        plan.statements.push(format!(
            "DO $$ BEGIN CREATE TYPE {}.{} AS ENUM ({}); EXCEPTION WHEN duplicate_object THEN NULL; END $$",
            schema_name(e.schema_id.as_deref())?,
            quote(&e.name),
            values.join(", ")
        ));
    }

    for t in &config.tables {
        let full_name = table_name(&t.id)?;
        let cols = columns_by_table.get(t.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let mut col_defs: Vec<String> = Vec::new();
        for c in cols {
            let mut def = format!("{} {}", quote(&c.name), c.type_.ddl());
            if !c.nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(d) = &c.default {
                def.push_str(" DEFAULT ");
                def.push_str(d.sql());
            }
            col_defs.push(def);
            if let Some(comment) = &c.comment {
                plan.comments.push(format!(
                    "COMMENT ON COLUMN {}.{} IS {}",
                    full_name,
                    quote(&c.name),
                    literal(comment)
                ));
            }
        }

        let declared: HashSet<&str> = cols.iter().map(|c| c.name.as_str()).collect();
        for (name, _, _) in AUDIT_COLUMNS {
            if !declared.contains(name) {
                col_defs.push(format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", quote(name)));
            }
        }

        let pk_cols: Vec<String> = t.primary_key.columns().into_iter().map(quote).collect();
        col_defs.push(format!("PRIMARY KEY ({})", pk_cols.join(", ")));

        for u in &t.unique {
            let cols: Vec<String> = u.iter().map(|s| quote(s)).collect();
            col_defs.push(format!("UNIQUE ({})", cols.join(", ")));
        }
        for ch in &t.check {
            col_defs.push(format!("CONSTRAINT {} CHECK ({})", quote(&ch.name), ch.expression));
        }

        plan.statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            full_name,
            col_defs.join(",\n  ")
        ));
        if let Some(c) = &t.comment {
            plan.comments.push(format!("COMMENT ON TABLE {} IS {}", full_name, literal(c)));
        }
    }

    for idx in &config.indexes {
        let cols: Vec<String> = idx.columns.iter().map(|c| quote(c)).collect();
        // Index names live in the table's schema.
        plan.statements.push(format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} USING btree ({})",
            if idx.unique { "UNIQUE " } else { "" },
            quote(&idx.name),
            table_name(&idx.table_id)?,
            cols.join(", ")
        ));
    }

    for rel in &config.relationships {
        let from_col = columns_by_id
            .get(rel.from_column_id.as_str())
            .ok_or_else(|| missing("column", &rel.from_column_id))?;
        let to_col = columns_by_id
            .get(rel.to_column_id.as_str())
            .ok_or_else(|| missing("column", &rel.to_column_id))?;
        let from_full = table_name(&rel.from_table_id)?;
        let to_full = table_name(&rel.to_table_id)?;
        let constraint = quote(rel.name.as_deref().unwrap_or(&rel.id));
        let on_delete = rel.on_delete.as_deref().unwrap_or("NO ACTION").to_uppercase();

        // Re-adding keeps referential actions in step with the config on every start.
        plan.statements.push(format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
            from_full, constraint
        ));
        plan.statements.push(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
            from_full,
            constraint,
            quote(&from_col.name),
            to_full,
            quote(&to_col.name),
            on_delete
        ));
    }

    Ok(plan)
}

/// Apply full config to the database. Validates config first; all structural DDL commits or none does.
pub async fn apply_migrations(pool: &PgPool, config: &FullConfig) -> Result<(), AppError> {
    let plan = plan_migrations(config)?;
    tracing::info!(
        schemas = config.schemas.len(),
        tables = config.tables.len(),
        statements = plan.statements.len(),
        "applying migrations"
    );

    let mut tx = pool.begin().await?;
    for sql in &plan.statements {
        tracing::debug!(sql = %sql, "ddl");
        sqlx::query(sql).execute(&mut *tx).await.map_err(|e| {
            tracing::error!(sql = %sql, error = %e, "migration statement failed");
            AppError::Db(e)
        })?;
    }
    tx.commit().await?;

    for sql in &plan.comments {
        if let Err(e) = sqlx::query(sql).execute(pool).await {
            tracing::warn!(sql = %sql, error = %e, "comment not applied");
        }
    }
    tracing::info!("migrations applied");
    Ok(())
}
