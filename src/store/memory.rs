use super::Store;
use crate::error::{IntegrityError, Result};
use crate::model::{Model, Row};
use crate::query::{json_equal, CompiledQuery, Selected};
use crate::value::is_blank;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct Table {
    last_id: i64,
    rows: BTreeMap<i64, Row>,
}

/// Store keeping every table in memory.
///
/// Unique constraints mirror the PostgreSQL schema: one per language key of
/// each slug field (blank values never conflict) and one per unique plain
/// column.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored for `model`.
    pub async fn count(&self, model: &Model) -> usize {
        let tables = self.tables.lock().await;
        tables.get(model.table()).map(|t| t.rows.len()).unwrap_or(0)
    }
}

fn localized_key<'a>(row: &'a Row, field: &str, language: &str) -> Option<&'a Value> {
    row.get(field)
        .and_then(|doc| doc.get(language))
        .filter(|value| !is_blank(value))
}

/// First unique constraint `row` would violate against the other rows.
fn check_unique(model: &Model, table: &Table, id: Option<i64>, row: &Row) -> Option<IntegrityError> {
    let others = || {
        table
            .rows
            .iter()
            .filter(move |(other, _)| Some(**other) != id)
            .map(|(_, row)| row)
    };

    for field in model.localized_fields() {
        for language in field.unique_languages() {
            let Some(value) = localized_key(row, field.name(), &language) else {
                continue;
            };
            let taken = others().any(|other| {
                localized_key(other, field.name(), &language)
                    .map(|existing| json_equal(existing, value))
                    .unwrap_or(false)
            });
            if taken {
                return Some(IntegrityError::unique_language(field.name(), &language));
            }
        }
    }

    for column in model.columns().iter().filter(|c| c.unique) {
        let Some(value) = row.get(&column.name).filter(|v| !v.is_null()) else {
            continue;
        };
        let taken = others().any(|other| {
            other
                .get(&column.name)
                .map(|existing| json_equal(existing, value))
                .unwrap_or(false)
        });
        if taken {
            return Some(IntegrityError::unique_column(&column.name));
        }
    }

    None
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_atomic(&self, model: &Model, id: Option<i64>, row: &Row) -> Result<i64> {
        let mut tables = self.tables.lock().await;
        let table = tables.entry(model.table().to_string()).or_default();

        if let Some(err) = check_unique(model, table, id, row) {
            debug!("{}: rejected write: {}", model.table(), err);
            return Err(err.into());
        }

        let id = match id {
            Some(id) => {
                table.last_id = table.last_id.max(id);
                id
            }
            None => {
                table.last_id += 1;
                table.last_id
            }
        };
        let mut stored = row.clone();
        stored.insert("id".to_string(), Value::from(id));
        table.rows.insert(id, stored);
        Ok(id)
    }

    async fn fetch(&self, model: &Model, id: i64) -> Result<Option<Row>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .get(model.table())
            .and_then(|table| table.rows.get(&id))
            .cloned())
    }

    async fn delete(&self, model: &Model, id: i64) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .get_mut(model.table())
            .map(|table| table.rows.remove(&id).is_some())
            .unwrap_or(false))
    }

    async fn select(&self, query: &CompiledQuery) -> Result<Vec<Selected>> {
        let tables = self.tables.lock().await;
        match tables.get(query.model.table()) {
            Some(table) => query.apply(table.rows.iter().map(|(id, row)| (*id, row))),
            None => Ok(Vec::new()),
        }
    }
}
