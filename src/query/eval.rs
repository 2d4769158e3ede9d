//! In-memory evaluation of expressions against stored rows.

use super::Expr;
use crate::config::{self, Settings};
use crate::error::Result;
use crate::model::{Model, Row};
use crate::resolver;
use crate::value::is_blank;
use serde_json::Value;
use std::sync::Arc;

/// Language and settings a query runs under, captured when it is executed.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub settings: Arc<Settings>,
    pub language: String,
}

impl EvalContext {
    /// Current settings and active language (primary when none is active).
    pub fn current() -> Self {
        let settings = config::settings();
        let language = resolver::target_language(&settings, None);
        Self { settings, language }
    }

    pub fn with_language(settings: Arc<Settings>, language: impl Into<String>) -> Self {
        Self {
            settings,
            language: language.into(),
        }
    }

    /// Languages `translated_ref` consults, in order.
    pub fn chain(&self) -> Vec<String> {
        resolver::language_chain(&self.settings, &self.language)
    }
}

/// Value of `expr` for one row. Missing values evaluate to null.
pub fn evaluate(expr: &Expr, row: &Row, model: &Model, ctx: &EvalContext) -> Result<Value> {
    match expr {
        Expr::Value(value) => Ok(value.clone()),
        Expr::Column(name) => {
            let key = if name == "pk" { "id" } else { name.as_str() };
            Ok(row.get(key).cloned().unwrap_or(Value::Null))
        }
        Expr::Key { field, language } => key_value(row, model, field, language),
        Expr::Active(field) => key_value(row, model, field, &ctx.language),
        Expr::Translated(field) => {
            let document = document(row, model, field)?;
            Ok(ctx
                .chain()
                .iter()
                .filter_map(|language| document.and_then(|doc| doc.get(language)))
                .find(|value| !is_blank(value))
                .cloned()
                .unwrap_or(Value::Null))
        }
    }
}

/// Stored document of a localized field, as the row holds it.
fn document<'a>(row: &'a Row, model: &Model, field: &str) -> Result<Option<&'a Value>> {
    if model.localized_field(field).is_none() {
        return Err(model.unknown_field(field));
    }
    Ok(row.get(field))
}

/// One language key of the stored document. A missing key and JSON null both
/// read as null; non-object documents have no keys.
fn key_value(row: &Row, model: &Model, field: &str, language: &str) -> Result<Value> {
    Ok(document(row, model, field)?
        .and_then(|doc| doc.get(language))
        .cloned()
        .unwrap_or(Value::Null))
}

/// Projected value as returned to callers: per-language reads are coerced to
/// the field's kind.
pub fn decode(expr: &Expr, model: &Model, raw: Value) -> Value {
    match expr.localized_field().and_then(|field| model.localized_field(field)) {
        Some(column) => column.decode_projection(raw),
        None => raw,
    }
}
