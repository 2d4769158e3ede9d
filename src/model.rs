//! Model schemas and instances.
//!
//! A [`Model`] lists its localized fields and plain columns. An [`Instance`]
//! holds one container per localized field and applies the assignment rules
//! application code relies on (mapping replaces, bare scalar sets the active
//! language, JSON text is decoded).

use crate::config;
use crate::error::{LocalizedError, Result};
use crate::field::{LocalizedColumn, UniqueSlugField};
use crate::query::{self, EvalContext};
use crate::resolver;
use crate::value::{is_blank, LocalizedValue, Raw, Text, ValueKind};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One stored row: column name to stored value. Localized columns hold their
/// JSON document.
pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainColumn {
    pub name: String,
    pub unique: bool,
}

pub struct Model {
    name: String,
    table: String,
    localized: Vec<Arc<dyn LocalizedColumn>>,
    columns: Vec<PlainColumn>,
    slug_retry: bool,
}

impl Model {
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        let name = name.into();
        ModelBuilder {
            table: name.to_lowercase(),
            name,
            localized: Vec::new(),
            columns: Vec::new(),
            slug_retry: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn localized_fields(&self) -> &[Arc<dyn LocalizedColumn>] {
        &self.localized
    }

    pub fn localized_field(&self, name: &str) -> Option<&Arc<dyn LocalizedColumn>> {
        self.localized.iter().find(|f| f.name() == name)
    }

    pub fn columns(&self) -> &[PlainColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&PlainColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether saves of this model run the atomic slug retry protocol.
    pub fn has_slug_retry(&self) -> bool {
        self.slug_retry
    }

    /// Enabled slug fields, in declaration order.
    pub fn slug_fields(&self) -> impl Iterator<Item = &UniqueSlugField> {
        self.localized
            .iter()
            .filter_map(|f| f.as_slug())
            .filter(|slug| slug.is_enabled())
    }

    pub fn has_field(&self, name: &str) -> bool {
        name == "id"
            || name == "pk"
            || self.localized_field(name).is_some()
            || self.column(name).is_some()
    }

    pub fn unknown_field(&self, name: &str) -> LocalizedError {
        LocalizedError::UnknownField {
            model: self.name.clone(),
            field: name.to_string(),
        }
    }

    /// Fresh instance with empty containers.
    pub fn instance(self: &Arc<Self>) -> Instance {
        let localized = self
            .localized
            .iter()
            .map(|f| (f.name().to_string(), f.empty_value()))
            .collect();
        let columns = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), Value::Null))
            .collect();
        Instance {
            model: Arc::clone(self),
            id: None,
            localized,
            columns,
            annotations: BTreeMap::new(),
            retries: 0,
        }
    }

    /// Instance reconstructed from a stored row.
    pub fn from_row(self: &Arc<Self>, id: i64, row: &Row) -> Instance {
        let mut instance = self.instance();
        instance.id = Some(id);
        for field in &self.localized {
            let value = field.load(row.get(field.name()).cloned());
            instance.localized.insert(field.name().to_string(), value);
        }
        for column in &self.columns {
            if let Some(value) = row.get(&column.name) {
                instance.columns.insert(column.name.clone(), value.clone());
            }
        }
        instance
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("localized", &self.localized)
            .field("columns", &self.columns)
            .field("slug_retry", &self.slug_retry)
            .finish()
    }
}

pub struct ModelBuilder {
    name: String,
    table: String,
    localized: Vec<Arc<dyn LocalizedColumn>>,
    columns: Vec<PlainColumn>,
    slug_retry: bool,
}

impl ModelBuilder {
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn field(mut self, field: impl LocalizedColumn + 'static) -> Self {
        self.localized.push(Arc::new(field));
        self
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(PlainColumn {
            name: name.into(),
            unique: false,
        });
        self
    }

    pub fn unique_column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(PlainColumn {
            name: name.into(),
            unique: true,
        });
        self
    }

    /// Give the model the atomic slug retry capability slug fields need.
    pub fn atomic_slug_retry(mut self) -> Self {
        self.slug_retry = true;
        self
    }

    pub fn build(self) -> Arc<Model> {
        Arc::new(Model {
            name: self.name,
            table: self.table,
            localized: self.localized,
            columns: self.columns,
            slug_retry: self.slug_retry,
        })
    }
}

/// Anything that can be assigned to a field of an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Container(LocalizedValue<Raw>),
    Json(Value),
}

impl<K: ValueKind> From<LocalizedValue<K>> for Assignment {
    fn from(value: LocalizedValue<K>) -> Self {
        Assignment::Container(value.cast())
    }
}

impl From<Value> for Assignment {
    fn from(value: Value) -> Self {
        Assignment::Json(value)
    }
}

impl From<&str> for Assignment {
    fn from(value: &str) -> Self {
        Assignment::Json(Value::String(value.to_string()))
    }
}

impl From<String> for Assignment {
    fn from(value: String) -> Self {
        Assignment::Json(Value::String(value))
    }
}

impl From<i64> for Assignment {
    fn from(value: i64) -> Self {
        Assignment::Json(Value::from(value))
    }
}

impl From<f64> for Assignment {
    fn from(value: f64) -> Self {
        Assignment::Json(Value::from(value))
    }
}

impl From<bool> for Assignment {
    fn from(value: bool) -> Self {
        Assignment::Json(Value::Bool(value))
    }
}

#[derive(Clone)]
pub struct Instance {
    model: Arc<Model>,
    id: Option<i64>,
    localized: BTreeMap<String, LocalizedValue<Raw>>,
    columns: BTreeMap<String, Value>,
    annotations: BTreeMap<String, Value>,
    retries: u32,
}

impl Instance {
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Slug conflicts seen by the most recent save.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub(crate) fn set_retries(&mut self, retries: u32) {
        self.retries = retries;
    }

    /// Assign a field.
    ///
    /// For localized fields a container or mapping replaces the current value,
    /// JSON text of an object is decoded and replaces it, null resets it, and
    /// any other scalar is stored for the active language on the existing
    /// container.
    pub fn set(&mut self, name: &str, value: impl Into<Assignment>) -> Result<()> {
        let assignment = value.into();
        if let Some(field) = self.model.localized_field(name).cloned() {
            let container = match assignment {
                Assignment::Container(container) => container,
                Assignment::Json(json @ (Value::Object(_) | Value::Array(_))) => field.load(Some(json)),
                Assignment::Json(Value::Null) => field.empty_value(),
                Assignment::Json(Value::String(text)) => {
                    match serde_json::from_str::<Value>(&text) {
                        Ok(parsed @ Value::Object(_)) => field.load(Some(parsed)),
                        _ => return self.set_active(name, Value::String(text)),
                    }
                }
                Assignment::Json(scalar) => return self.set_active(name, scalar),
            };
            self.localized.insert(name.to_string(), container);
            return Ok(());
        }

        if self.model.column(name).is_some() {
            let value = match assignment {
                Assignment::Container(container) => container.to_json(),
                Assignment::Json(json) => json,
            };
            self.columns.insert(name.to_string(), value);
            return Ok(());
        }

        Err(self.model.unknown_field(name))
    }

    fn set_active(&mut self, name: &str, value: Value) -> Result<()> {
        let settings = config::settings();
        let language = resolver::target_language(&settings, None);
        self.localized_mut(name)?.set(&language, value);
        Ok(())
    }

    pub fn localized(&self, name: &str) -> Result<&LocalizedValue<Raw>> {
        self.localized
            .get(name)
            .ok_or_else(|| self.model.unknown_field(name))
    }

    pub fn localized_mut(&mut self, name: &str) -> Result<&mut LocalizedValue<Raw>> {
        match self.localized.get_mut(name) {
            Some(value) => Ok(value),
            None => Err(self.model.unknown_field(name)),
        }
    }

    /// Typed copy of a localized field's container.
    pub fn get<K: ValueKind>(&self, name: &str) -> Result<LocalizedValue<K>> {
        self.localized(name).map(|value| value.cast::<K>())
    }

    pub fn column(&self, name: &str) -> Option<&Value> {
        self.columns.get(name).filter(|v| !v.is_null())
    }

    /// Value computed by a query annotation, decoded to the field's kind.
    pub fn annotation(&self, name: &str) -> Option<&Value> {
        self.annotations.get(name)
    }

    pub(crate) fn set_annotation(&mut self, name: impl Into<String>, value: Value) {
        self.annotations.insert(name.into(), value);
    }

    /// Text of `name` for `language`, used as slug source. Blank gives `None`.
    pub fn source_text(&self, name: &str, language: &str) -> Option<String> {
        if let Some(value) = self.localized.get(name) {
            return value
                .get(language)
                .filter(|v| !is_blank(v))
                .and_then(Text::coerce);
        }
        self.column(name)
            .filter(|v| !is_blank(v))
            .and_then(Text::coerce)
    }

    /// Current value of a field as a row would hold it.
    pub fn field_value(&self, name: &str) -> Option<Value> {
        if name == "id" || name == "pk" {
            return self.id.map(Value::from);
        }
        if let Some(value) = self.localized.get(name) {
            return Some(value.to_json());
        }
        self.columns.get(name).cloned()
    }

    /// Validate every localized field and build the row to store.
    ///
    /// Deferred expressions are evaluated against the other values of the
    /// row being written.
    pub fn to_row(&self) -> Result<Row> {
        let mut row: Row = self.columns.clone();
        for field in self.model.localized_fields() {
            let value = self.localized(field.name())?;
            row.insert(field.name().to_string(), value.to_json());
        }
        if let Some(id) = self.id {
            row.insert("id".to_string(), Value::from(id));
        }

        let ctx = EvalContext::current();
        let mut out: Row = self.columns.clone();
        for field in self.model.localized_fields() {
            let value = self.localized(field.name())?;
            let prepared = if value.deferred().is_empty() {
                field.prepare(value)?
            } else {
                let mut resolved = value.clone();
                for (language, expr) in value.deferred() {
                    let computed = query::evaluate(expr, &row, &self.model, &ctx)?;
                    resolved.set(language, computed);
                }
                field.prepare(&resolved)?
            };
            out.insert(field.name().to_string(), prepared.unwrap_or(Value::Null));
        }
        Ok(out)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("model", &self.model.name)
            .field("id", &self.id)
            .field("localized", &self.localized)
            .field("columns", &self.columns)
            .field("annotations", &self.annotations)
            .field("retries", &self.retries)
            .finish()
    }
}
