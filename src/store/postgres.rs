//! PostgreSQL store over `sqlx`.
//!
//! Each model maps to one table: a `BIGSERIAL` id plus one `jsonb` column per
//! plain column and per localized field. Slug fields get one partial unique
//! index per language key; blank keys are excluded from the index.

use super::Store;
use crate::error::{IntegrityError, LocalizedError, Result};
use crate::model::{Model, Row};
use crate::query::{compile_select, ident, CompiledQuery, Selected, SqlParam};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row as _;
use std::collections::BTreeMap;
use tracing::{debug, info};

const UNIQUE_VIOLATION: &str = "23505";

/// Store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Name of the partial unique index on one language key of a slug field.
pub fn language_index_name(model: &Model, field: &str, language: &str) -> String {
    format!("{}_{}_{}_uniq", model.table(), field, language)
}

/// Name of the unique constraint on a plain column.
pub fn column_constraint_name(model: &Model, column: &str) -> String {
    format!("{}_{}_key", model.table(), column)
}

/// DDL creating the table and its unique indexes, in execution order.
pub fn schema_statements(model: &Model) -> Vec<String> {
    let mut columns = vec![format!("{} BIGSERIAL PRIMARY KEY", ident("id"))];
    for column in model.columns() {
        if column.unique {
            columns.push(format!(
                "{} jsonb CONSTRAINT {} UNIQUE",
                ident(&column.name),
                ident(&column_constraint_name(model, &column.name))
            ));
        } else {
            columns.push(format!("{} jsonb", ident(&column.name)));
        }
    }
    for field in model.localized_fields() {
        columns.push(format!("{} jsonb", ident(field.name())));
    }

    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        ident(model.table()),
        columns.join(", ")
    )];

    for field in model.localized_fields() {
        for language in field.unique_languages() {
            let key = format!("({} ->> {})", ident(field.name()), literal(&language));
            statements.push(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({}) WHERE {} <> ''",
                ident(&language_index_name(model, field.name(), &language)),
                ident(model.table()),
                key,
                key
            ));
        }
    }
    statements
}

/// Map a violated constraint name back to the field (and language) it guards.
fn integrity_error(model: &Model, constraint: Option<&str>, message: &str) -> IntegrityError {
    if let Some(constraint) = constraint {
        for field in model.localized_fields() {
            for language in field.unique_languages() {
                if constraint == language_index_name(model, field.name(), &language) {
                    return IntegrityError::unique_language(field.name(), &language);
                }
            }
        }
        for column in model.columns() {
            if constraint == column_constraint_name(model, &column.name) {
                return IntegrityError::unique_column(&column.name);
            }
        }
    }
    IntegrityError::new(message)
}

fn map_write_error(model: &Model, err: sqlx::Error) -> LocalizedError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return integrity_error(model, db.constraint(), db.message()).into();
        }
    }
    err.into()
}

fn read_row(model: &Model, row: &PgRow) -> Result<(i64, Row)> {
    let id: i64 = row.try_get(0)?;
    let mut values = Row::new();
    values.insert("id".to_string(), Value::from(id));
    let names = model
        .columns()
        .iter()
        .map(|c| c.name.as_str())
        .chain(model.localized_fields().iter().map(|f| f.name()));
    for (index, name) in names.enumerate() {
        let value: Option<Value> = row.try_get(index + 1)?;
        values.insert(name.to_string(), value.unwrap_or(Value::Null));
    }
    Ok((id, values))
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the model's table and unique indexes when missing.
    pub async fn ensure_schema(&self, model: &Model) -> Result<()> {
        for statement in schema_statements(model) {
            debug!("{}", statement);
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Drop the model's table.
    pub async fn drop_table(&self, model: &Model) -> Result<()> {
        let statement = format!("DROP TABLE IF EXISTS {}", ident(model.table()));
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn save_atomic(&self, model: &Model, id: Option<i64>, row: &Row) -> Result<i64> {
        let names: Vec<&str> = model
            .columns()
            .iter()
            .map(|c| c.name.as_str())
            .chain(model.localized_fields().iter().map(|f| f.name()))
            .collect();

        let mut columns: Vec<String> = Vec::new();
        let mut placeholders: Vec<String> = Vec::new();
        if id.is_some() {
            columns.push(ident("id"));
            placeholders.push("$1".to_string());
        }
        let offset = placeholders.len();
        for (index, name) in names.iter().enumerate() {
            columns.push(ident(name));
            placeholders.push(format!("${}", index + offset + 1));
        }

        let mut statement = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            ident(model.table()),
            columns.join(", "),
            placeholders.join(", ")
        );
        if id.is_some() {
            let updates: Vec<String> = names
                .iter()
                .map(|name| format!("{} = EXCLUDED.{}", ident(name), ident(name)))
                .collect();
            statement.push_str(&format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                ident("id"),
                updates.join(", ")
            ));
        }
        statement.push_str(&format!(" RETURNING {}", ident("id")));

        let mut query = sqlx::query_scalar::<_, i64>(&statement);
        if let Some(id) = id {
            query = query.bind(id);
        }
        for name in &names {
            let value = row.get(*name).filter(|v| !v.is_null()).cloned();
            query = query.bind(value);
        }

        // The transaction rolls back on drop, so a failed attempt leaves nothing behind.
        let mut tx = self.pool.begin().await?;
        let saved = query
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_write_error(model, e))?;
        tx.commit().await?;
        Ok(saved)
    }

    async fn fetch(&self, model: &Model, id: i64) -> Result<Option<Row>> {
        let names: Vec<String> = std::iter::once(ident("id"))
            .chain(model.columns().iter().map(|c| ident(&c.name)))
            .chain(model.localized_fields().iter().map(|f| ident(f.name())))
            .collect();
        let statement = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            names.join(", "),
            ident(model.table()),
            ident("id")
        );
        let row = sqlx::query(&statement)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(read_row(model, &row)?.1)),
            None => Ok(None),
        }
    }

    async fn delete(&self, model: &Model, id: i64) -> Result<bool> {
        let statement = format!(
            "DELETE FROM {} WHERE {} = $1",
            ident(model.table()),
            ident("id")
        );
        let result = sqlx::query(&statement).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn select(&self, query: &CompiledQuery) -> Result<Vec<Selected>> {
        let statement = compile_select(query);
        debug!("{}", statement.sql);

        let mut sql_query = sqlx::query(&statement.sql);
        for param in &statement.params {
            sql_query = match param {
                SqlParam::Text(text) => sql_query.bind(text.clone()),
                SqlParam::Json(value) => sql_query.bind(value.clone()),
            };
        }
        let rows = sql_query.fetch_all(&self.pool).await?;

        let model = query.model.as_ref();
        let base = 1 + statement.columns.len();
        let mut selected = Vec::with_capacity(rows.len());
        for pg_row in &rows {
            let (id, row) = read_row(model, pg_row)?;
            let mut annotations = BTreeMap::new();
            for (index, name) in statement.annotations.iter().enumerate() {
                let value: Option<Value> = pg_row.try_get(base + index)?;
                annotations.insert(name.clone(), value.unwrap_or(Value::Null));
            }
            let mut projected = Vec::with_capacity(statement.projected.len());
            let projected_base = base + statement.annotations.len();
            for (index, name) in statement.projected.iter().enumerate() {
                let value: Option<Value> = pg_row.try_get(projected_base + index)?;
                projected.push((name.clone(), value.unwrap_or(Value::Null)));
            }
            selected.push(Selected {
                id,
                row,
                annotations,
                projected,
            });
        }
        Ok(selected)
    }
}
