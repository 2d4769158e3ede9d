//! PostgreSQL rendering of compiled queries.
//!
//! Localized fields and plain columns are stored as `jsonb`. Every expression
//! renders to a `jsonb` value so comparisons and ordering follow the same
//! rules as the in-memory evaluator.

use super::{as_text, CompiledQuery, Expr, Lookup, Predicate};
use serde_json::Value;

/// A bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Json(Value),
}

/// A statement with its parameters and the names of the columns it returns.
///
/// Result columns are, in order: `id`, then `columns`, then one per
/// annotation, then one per projected path.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub columns: Vec<String>,
    pub annotations: Vec<String>,
    pub projected: Vec<String>,
}

/// Quote an identifier.
pub fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

struct Builder<'a> {
    query: &'a CompiledQuery,
    params: Vec<SqlParam>,
}

impl<'a> Builder<'a> {
    fn bind(&mut self, param: SqlParam) -> String {
        let cast = match param {
            SqlParam::Text(_) => "text",
            SqlParam::Json(_) => "jsonb",
        };
        self.params.push(param);
        format!("${}::{}", self.params.len(), cast)
    }

    fn key(&mut self, field: &str, language: &str) -> String {
        let key = self.bind(SqlParam::Text(language.to_string()));
        format!("NULLIF({} -> {}, 'null'::jsonb)", ident(field), key)
    }

    fn expr(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Column(name) if name == "id" || name == "pk" => "to_jsonb(\"id\")".to_string(),
            Expr::Column(name) => ident(name),
            Expr::Key { field, language } => self.key(field, language),
            Expr::Active(field) => {
                let language = self.query.ctx.language.clone();
                self.key(field, &language)
            }
            Expr::Translated(field) => {
                let candidates: Vec<String> = self
                    .query
                    .ctx
                    .chain()
                    .iter()
                    .map(|language| {
                        let value = self.key(field, language);
                        format!("NULLIF({}, '\"\"'::jsonb)", value)
                    })
                    .collect();
                format!("COALESCE({})", candidates.join(", "))
            }
            Expr::Value(value) => self.bind(SqlParam::Json(value.clone())),
        }
    }

    fn text_param(&mut self, value: &Value) -> String {
        self.bind(SqlParam::Text(as_text(value).unwrap_or_default()))
    }

    fn predicate(&mut self, predicate: &Predicate) -> String {
        let lhs = self.expr(&predicate.expr);
        let text = format!("({} #>> '{{}}')", lhs);
        let rhs = &predicate.value;

        let condition = match predicate.lookup {
            Lookup::Exact if rhs.is_null() => format!("{} IS NULL", lhs),
            Lookup::Exact => format!("{} = {}", lhs, self.bind(SqlParam::Json(rhs.clone()))),
            Lookup::IExact => format!("lower({}) = lower({})", text, self.text_param(rhs)),
            Lookup::Contains => format!("strpos({}, {}) > 0", text, self.text_param(rhs)),
            Lookup::IContains => {
                format!("strpos(lower({}), lower({})) > 0", text, self.text_param(rhs))
            }
            Lookup::StartsWith => format!("starts_with({}, {})", text, self.text_param(rhs)),
            Lookup::IStartsWith => {
                format!("starts_with(lower({}), lower({}))", text, self.text_param(rhs))
            }
            Lookup::EndsWith => {
                let param = self.text_param(rhs);
                format!("right({}, length({})) = {}", text, param, param)
            }
            Lookup::IEndsWith => {
                let param = self.text_param(rhs);
                format!("lower(right({}, length({}))) = lower({})", text, param, param)
            }
            Lookup::In => format!(
                "jsonb_build_array({}) <@ {}",
                lhs,
                self.bind(SqlParam::Json(rhs.clone()))
            ),
            Lookup::IsNull if rhs.as_bool().unwrap_or(true) => format!("{} IS NULL", lhs),
            Lookup::IsNull => format!("{} IS NOT NULL", lhs),
            Lookup::Regex => format!("{} ~ {}", text, self.text_param(rhs)),
            Lookup::IRegex => format!("{} ~* {}", text, self.text_param(rhs)),
        };

        if predicate.negated {
            format!("NOT COALESCE(({}), false)", condition)
        } else {
            format!("COALESCE(({}), false)", condition)
        }
    }
}

/// Render a compiled query as a single `SELECT`.
pub fn compile_select(query: &CompiledQuery) -> SqlStatement {
    let model = query.model.as_ref();
    let mut builder = Builder {
        query,
        params: Vec::new(),
    };

    let columns: Vec<String> = model
        .columns()
        .iter()
        .map(|c| c.name.clone())
        .chain(model.localized_fields().iter().map(|f| f.name().to_string()))
        .collect();

    let mut select = vec![ident("id")];
    select.extend(columns.iter().map(|c| ident(c)));

    let mut annotations = Vec::new();
    for (index, (name, expr)) in query.annotations.iter().enumerate() {
        select.push(format!("{} AS {}", builder.expr(expr), ident(&format!("__a{}", index))));
        annotations.push(name.clone());
    }

    let mut projected = Vec::new();
    if let Some(paths) = &query.projection {
        for (index, (name, expr)) in paths.iter().enumerate() {
            select.push(format!("{} AS {}", builder.expr(expr), ident(&format!("__p{}", index))));
            projected.push(name.clone());
        }
    }

    let mut sql = format!("SELECT {} FROM {}", select.join(", "), ident(model.table()));

    if !query.predicates.is_empty() {
        let conditions: Vec<String> = query
            .predicates
            .iter()
            .map(|p| builder.predicate(p))
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    let mut order: Vec<String> = query
        .ordering
        .iter()
        .map(|key| {
            let expr = builder.expr(&key.expr);
            if key.descending {
                format!("{} DESC NULLS FIRST", expr)
            } else {
                format!("{} ASC NULLS LAST", expr)
            }
        })
        .collect();
    order.push(format!("{} ASC", ident("id")));
    sql.push_str(" ORDER BY ");
    sql.push_str(&order.join(", "));

    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    SqlStatement {
        sql,
        params: builder.params,
        columns,
        annotations,
        projected,
    }
}
