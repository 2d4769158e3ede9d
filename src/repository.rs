//! Saving and loading model instances through a [`Store`].

use crate::error::{LocalizedError, Result};
use crate::field::{LocalizedColumn, SlugConflicts};
use crate::model::{Assignment, Instance, Model, Row};
use crate::query::{decode, EvalContext, Query};
use crate::retry::{self, RetryConfig};
use crate::store::Store;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Entry point for persisting instances.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn Store>,
}

/// Copy of `instance` with slugs generated around `conflicts` and its row.
fn prepare_attempt(instance: &Instance, conflicts: &SlugConflicts) -> Result<(Instance, Row)> {
    let model = Arc::clone(instance.model());
    let mut attempt = instance.clone();
    for slug in model.slug_fields() {
        let value = slug.populate(instance, conflicts)?;
        attempt.set(slug.name(), value)?;
    }
    attempt.set_retries(conflicts.count());
    let row = attempt.to_row()?;
    Ok((attempt, row))
}

impl Repository {
    pub fn new(store: impl Store + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn from_arc(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Validate and write `instance`, assigning its id on insert.
    ///
    /// Models with enabled slug fields run the atomic retry protocol: slugs are
    /// regenerated and the write retried on each slug uniqueness conflict, up
    /// to the configured budget. Every other error is returned unchanged.
    pub async fn save(&self, instance: &mut Instance) -> Result<()> {
        let model = Arc::clone(instance.model());

        if let Some(slug) = model.slug_fields().next() {
            if !model.has_slug_retry() {
                return Err(LocalizedError::MisconfiguredOwner {
                    model: model.name().to_string(),
                    field: slug.name().to_string(),
                });
            }
        } else {
            let row = instance.to_row()?;
            let id = self.store.save_atomic(&model, instance.id(), &row).await?;
            instance.set_id(id);
            return Ok(());
        }

        let config = RetryConfig::current();
        let operation_name = format!("{}.save", model.name());
        let store = &self.store;
        let base: &Instance = instance;
        let mut conflicts = SlugConflicts::new();

        let (id, saved) = retry::with_retry_if(
            &config,
            &operation_name,
            |_, last: Option<&LocalizedError>| {
                if let Some(conflict) = last.and_then(LocalizedError::as_integrity) {
                    conflicts.record(conflict);
                }
                let prepared = prepare_attempt(base, &conflicts);
                let model = Arc::clone(&model);
                async move {
                    let (attempt, row) = prepared?;
                    let id = store.save_atomic(&model, attempt.id(), &row).await?;
                    Ok::<_, LocalizedError>((id, attempt))
                }
            },
            |err| retry::is_retryable(&model, err),
        )
        .await?;

        *instance = saved;
        instance.set_id(id);
        debug!("{}: saved row {}", model.name(), id);
        Ok(())
    }

    /// Build, assign and save a new instance.
    pub async fn create<I, S, A>(&self, model: &Arc<Model>, values: I) -> Result<Instance>
    where
        I: IntoIterator<Item = (S, A)>,
        S: AsRef<str>,
        A: Into<Assignment>,
    {
        let mut instance = model.instance();
        for (name, value) in values {
            instance.set(name.as_ref(), value)?;
        }
        self.save(&mut instance).await?;
        Ok(instance)
    }

    pub async fn get(&self, model: &Arc<Model>, id: i64) -> Result<Option<Instance>> {
        let row = self.store.fetch(model, id).await?;
        Ok(row.map(|row| model.from_row(id, &row)))
    }

    /// Remove a saved instance. Returns whether a row was deleted.
    pub async fn delete(&self, instance: &Instance) -> Result<bool> {
        match instance.id() {
            Some(id) => self.store.delete(instance.model(), id).await,
            None => Ok(false),
        }
    }

    /// Instances selected by `query`, with annotations attached.
    ///
    /// The query runs under the settings and language active now.
    pub async fn fetch(&self, query: &Query) -> Result<Vec<Instance>> {
        let compiled = query.compile(EvalContext::current())?;
        let model = Arc::clone(&compiled.model);
        let selected = self.store.select(&compiled).await?;

        Ok(selected
            .into_iter()
            .map(|s| {
                let mut instance = model.from_row(s.id, &s.row);
                for (name, expr) in &compiled.annotations {
                    let raw = s.annotations.get(name).cloned().unwrap_or(Value::Null);
                    instance.set_annotation(name.clone(), decode(expr, &model, raw));
                }
                instance
            })
            .collect())
    }

    /// Projected rows for a query built with [`Query::values`]; without a
    /// projection, the stored rows.
    pub async fn values(&self, query: &Query) -> Result<Vec<Row>> {
        let compiled = query.compile(EvalContext::current())?;
        let model = Arc::clone(&compiled.model);
        let selected = self.store.select(&compiled).await?;

        let Some(projection) = compiled.projection.as_ref() else {
            return Ok(selected.into_iter().map(|s| s.row).collect());
        };
        Ok(selected
            .into_iter()
            .map(|s| {
                projection
                    .iter()
                    .zip(s.projected)
                    .map(|((name, expr), (_, raw))| (name.clone(), decode(expr, &model, raw)))
                    .collect()
            })
            .collect())
    }

    /// Values of one projected path, in query order.
    pub async fn values_list(&self, query: &Query, path: &str) -> Result<Vec<Value>> {
        let rows = self.values(&query.clone().values([path])).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| row.remove(path).unwrap_or(Value::Null))
            .collect())
    }
}
