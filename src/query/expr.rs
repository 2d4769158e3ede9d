use serde_json::Value;
use std::fmt;

/// Query-time expression over a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Whole stored value of a column (the document, for localized fields)
    Column(String),
    /// One explicit language key of a localized field
    Key { field: String, language: String },
    /// Value for the language active when the query runs, without fallback
    Active(String),
    /// Value resolved through the fallback chain when the query runs
    Translated(String),
    /// Constant
    Value(Value),
}

impl Expr {
    /// Localized field this expression reads per language, if any.
    pub fn localized_field(&self) -> Option<&str> {
        match self {
            Expr::Key { field, .. } | Expr::Active(field) | Expr::Translated(field) => Some(field),
            Expr::Column(_) | Expr::Value(_) => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => f.write_str(name),
            Expr::Key { field, language } => write!(f, "{}__{}", field, language),
            Expr::Active(field) => write!(f, "{}__active_ref", field),
            Expr::Translated(field) => write!(f, "{}__translated_ref", field),
            Expr::Value(value) => write!(f, "{}", value),
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Value(value)
    }
}

/// A localized field's value in a given language, or in the language active
/// when the query runs.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizedRef {
    field: String,
    language: Option<String>,
}

impl LocalizedRef {
    pub fn new(field: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            field: field.into(),
            language: language.map(str::to_string),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

impl From<LocalizedRef> for Expr {
    fn from(reference: LocalizedRef) -> Self {
        match reference.language {
            Some(language) => Expr::Key {
                field: reference.field,
                language,
            },
            None => Expr::Active(reference.field),
        }
    }
}

/// Shorthand for [`LocalizedRef::new`].
pub fn l(field: &str, language: Option<&str>) -> LocalizedRef {
    LocalizedRef::new(field, language)
}
