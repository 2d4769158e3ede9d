//! Lookups and expressions over localized fields.
//!
//! Paths use the `field__<suffix>` syntax:
//!
//! - `name` / `name__icontains`: value in the active language (when lookups
//!   are registered; otherwise the whole document with `exact`/`isnull`)
//! - `name__en`, `name__en__startswith`: explicit language key
//! - `name__active_ref`: active language, no fallback
//! - `name__translated_ref`: fallback chain
//!
//! A [`Query`] is compiled under an [`EvalContext`] when executed, so the
//! active language and settings are read at execution time.

mod eval;
mod expr;
mod lookup;
mod sql;

pub use eval::{decode, evaluate, EvalContext};
pub use expr::{l, Expr, LocalizedRef};
pub use lookup::{as_text, compare_json, json_equal, Lookup, Pattern};
pub use sql::{compile_select, ident, SqlParam, SqlStatement};

use crate::error::{LocalizedError, Result};
use crate::model::{Model, Row};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    path: String,
    value: Value,
    negated: bool,
}

/// Query builder over one model.
#[derive(Debug, Clone)]
pub struct Query {
    model: Arc<Model>,
    annotations: Vec<(String, Expr)>,
    conditions: Vec<Condition>,
    ordering: Vec<String>,
    projection: Option<Vec<String>>,
    limit: Option<usize>,
}

impl Query {
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            annotations: Vec::new(),
            conditions: Vec::new(),
            ordering: Vec::new(),
            projection: None,
            limit: None,
        }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Keep rows where `path` matches `value`.
    pub fn filter(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            path: path.to_string(),
            value: value.into(),
            negated: false,
        });
        self
    }

    /// Drop rows where `path` matches `value`.
    pub fn exclude(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            path: path.to_string(),
            value: value.into(),
            negated: true,
        });
        self
    }

    /// Add a named computed value, usable in filters, ordering and projections.
    pub fn annotate(mut self, name: &str, expr: impl Into<Expr>) -> Self {
        self.annotations.push((name.to_string(), expr.into()));
        self
    }

    /// Order by a path or annotation; a leading `-` sorts descending.
    pub fn order_by(mut self, path: &str) -> Self {
        self.ordering.push(path.to_string());
        self
    }

    /// Return only these paths or annotations.
    pub fn values<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_projection(&self) -> bool {
        self.projection.is_some()
    }

    /// Resolve every path under `ctx`.
    pub fn compile(&self, ctx: EvalContext) -> Result<CompiledQuery> {
        let mut predicates = Vec::with_capacity(self.conditions.len());
        for condition in &self.conditions {
            let (expr, lookup) = self.resolve(&condition.path, &ctx)?;
            lookup.check(&condition.value)?;
            predicates.push(Predicate {
                expr,
                lookup,
                pattern: lookup.pattern(&condition.value)?,
                value: condition.value.clone(),
                negated: condition.negated,
            });
        }

        let mut ordering = Vec::with_capacity(self.ordering.len());
        for path in &self.ordering {
            let (descending, path) = match path.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, path.as_str()),
            };
            ordering.push(OrderKey {
                expr: self.resolve_accessor(path, &ctx)?,
                descending,
            });
        }

        let projection = match &self.projection {
            Some(paths) => Some(
                paths
                    .iter()
                    .map(|path| Ok((path.clone(), self.resolve_accessor(path, &ctx)?)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };

        Ok(CompiledQuery {
            model: Arc::clone(&self.model),
            annotations: self.annotations.clone(),
            predicates,
            ordering,
            projection,
            limit: self.limit,
            ctx,
        })
    }

    fn annotation(&self, name: &str) -> Option<&Expr> {
        self.annotations
            .iter()
            .find(|(annotation, _)| annotation == name)
            .map(|(_, expr)| expr)
    }

    /// A path that names a value, without a trailing lookup.
    fn resolve_accessor(&self, path: &str, ctx: &EvalContext) -> Result<Expr> {
        match self.resolve(path, ctx)? {
            (expr, Lookup::Exact) if !path.ends_with("__exact") => Ok(expr),
            _ => Err(LocalizedError::Lookup(path.to_string())),
        }
    }

    /// Split a path into the expression it reads and the lookup applied.
    fn resolve(&self, path: &str, ctx: &EvalContext) -> Result<(Expr, Lookup)> {
        let mut parts = path.split("__");
        let head = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();

        let invalid = || LocalizedError::Lookup(path.to_string());
        let single_lookup = |rest: &[&str]| -> Result<Lookup> {
            match rest {
                [] => Ok(Lookup::Exact),
                [op] => Lookup::parse(op).ok_or_else(invalid),
                _ => Err(invalid()),
            }
        };

        if let Some(expr) = self.annotation(head) {
            return Ok((expr.clone(), single_lookup(&rest)?));
        }

        if head == "id" || head == "pk" || self.model.column(head).is_some() {
            return Ok((Expr::Column(head.to_string()), single_lookup(&rest)?));
        }

        if self.model.localized_field(head).is_none() {
            return Err(self.model.unknown_field(head));
        }
        let field = head.to_string();

        match rest.first().copied() {
            Some("active_ref") => Ok((Expr::Active(field), single_lookup(&rest[1..])?)),
            Some("translated_ref") => Ok((Expr::Translated(field), single_lookup(&rest[1..])?)),
            Some(code) if Lookup::parse(code).is_none() && ctx.settings.is_supported(code) => Ok((
                Expr::Key {
                    field,
                    language: code.to_string(),
                },
                single_lookup(&rest[1..])?,
            )),
            _ => {
                let lookup = single_lookup(&rest)?;
                if ctx.settings.register_lookups {
                    Ok((Expr::Active(field), lookup))
                } else if matches!(lookup, Lookup::Exact | Lookup::IsNull) {
                    Ok((Expr::Column(field), lookup))
                } else {
                    Err(invalid())
                }
            }
        }
    }
}

/// One filter condition, resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub expr: Expr,
    pub lookup: Lookup,
    /// Compiled regex for `regex`/`iregex`
    pub pattern: Option<Pattern>,
    pub value: Value,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub expr: Expr,
    pub descending: bool,
}

/// A query with every path resolved under a fixed context.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub model: Arc<Model>,
    pub annotations: Vec<(String, Expr)>,
    pub predicates: Vec<Predicate>,
    pub ordering: Vec<OrderKey>,
    pub projection: Option<Vec<(String, Expr)>>,
    pub limit: Option<usize>,
    pub ctx: EvalContext,
}

/// A row selected by a query, with its computed values.
#[derive(Debug, Clone, PartialEq)]
pub struct Selected {
    pub id: i64,
    pub row: Row,
    /// Annotation values by name
    pub annotations: BTreeMap<String, Value>,
    /// Projected values by requested path, in request order
    pub projected: Vec<(String, Value)>,
}

fn order_values(a: &Value, b: &Value, descending: bool) -> Ordering {
    // Nulls sort last ascending and first descending.
    let ordering = match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_json(a, b),
    };
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

impl CompiledQuery {
    /// Run the query over rows held in memory. Rows must carry their `id`.
    pub fn apply<'a, I>(&self, rows: I) -> Result<Vec<Selected>>
    where
        I: IntoIterator<Item = (i64, &'a Row)>,
    {
        let model = self.model.as_ref();
        let mut matched: Vec<(Selected, Vec<Value>)> = Vec::new();

        for (id, row) in rows {
            let mut keep = true;
            for predicate in &self.predicates {
                let lhs = evaluate(&predicate.expr, row, model, &self.ctx)?;
                let matched = predicate.lookup.matches_with(
                    &lhs,
                    &predicate.value,
                    predicate.pattern.as_ref(),
                );
                if matched == predicate.negated {
                    keep = false;
                    break;
                }
            }
            if !keep {
                continue;
            }

            let mut annotations = BTreeMap::new();
            for (name, expr) in &self.annotations {
                annotations.insert(name.clone(), evaluate(expr, row, model, &self.ctx)?);
            }
            let sort_keys = self
                .ordering
                .iter()
                .map(|key| evaluate(&key.expr, row, model, &self.ctx))
                .collect::<Result<Vec<_>>>()?;
            let projected = match &self.projection {
                Some(paths) => paths
                    .iter()
                    .map(|(name, expr)| Ok((name.clone(), evaluate(expr, row, model, &self.ctx)?)))
                    .collect::<Result<Vec<_>>>()?,
                None => Vec::new(),
            };

            matched.push((
                Selected {
                    id,
                    row: row.clone(),
                    annotations,
                    projected,
                },
                sort_keys,
            ));
        }

        matched.sort_by(|(a, a_keys), (b, b_keys)| {
            self.ordering
                .iter()
                .zip(a_keys.iter().zip(b_keys))
                .map(|(key, (x, y))| order_values(x, y, key.descending))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.id.cmp(&b.id))
        });

        let mut selected: Vec<Selected> = matched.into_iter().map(|(s, _)| s).collect();
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        Ok(selected)
    }
}
