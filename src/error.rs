use thiserror::Error;

/// A uniqueness violation reported by a store.
///
/// `language` is set when the violated constraint covers a single language
/// key of a localized column (the per-language slug indexes).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct IntegrityError {
    pub message: String,
    pub field: Option<String>,
    pub language: Option<String>,
}

impl IntegrityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
            language: None,
        }
    }

    /// Violation of the per-language unique constraint on `field`.
    pub fn unique_language(field: &str, language: &str) -> Self {
        Self {
            message: format!(
                "duplicate key value violates unique constraint on {}->{}",
                field, language
            ),
            field: Some(field.to_string()),
            language: Some(language.to_string()),
        }
    }

    /// Violation of a whole-column unique constraint.
    pub fn unique_column(field: &str) -> Self {
        Self {
            message: format!("duplicate key value violates unique constraint on {}", field),
            field: Some(field.to_string()),
            language: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LocalizedError {
    #[error("Value for language '{language}' must be {expected}")]
    ValueKind {
        language: String,
        expected: &'static str,
    },

    #[error("{field}: missing value for required language(s): {}", languages.join(", "))]
    RequiredLanguageMissing {
        field: String,
        languages: Vec<String>,
    },

    #[error(
        "Model '{model}' declares slug field '{field}' but has no atomic slug retry capability"
    )]
    MisconfiguredOwner { model: String, field: String },

    /// Storage uniqueness violation, surfaced as reported by the store.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("Unsupported language code: '{0}'")]
    UnsupportedLanguage(String),

    #[error("Unknown field '{field}' on model '{model}'")]
    UnknownField { model: String, field: String },

    #[error("Invalid lookup '{0}'")]
    Lookup(String),

    #[error("'{kind}' object has no attribute '{attribute}'")]
    MissingAttribute { kind: &'static str, attribute: String },

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl LocalizedError {
    /// The underlying integrity error, if this is a uniqueness violation.
    pub fn as_integrity(&self) -> Option<&IntegrityError> {
        match self {
            LocalizedError::Integrity(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for LocalizedError {
    fn from(err: sqlx::Error) -> Self {
        LocalizedError::Storage(err.to_string())
    }
}

pub type Result<T, E = LocalizedError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kind_message() {
        let err = LocalizedError::ValueKind {
            language: "nl".to_string(),
            expected: "an integer",
        };
        assert_eq!(err.to_string(), "Value for language 'nl' must be an integer");
    }

    #[test]
    fn test_required_language_message_names_languages() {
        let err = LocalizedError::RequiredLanguageMissing {
            field: "title".to_string(),
            languages: vec!["nl".to_string(), "fr".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("title"));
        assert!(message.contains("nl, fr"));
    }

    #[test]
    fn test_integrity_passes_through_unchanged() {
        let original = IntegrityError::unique_language("slug", "en");
        let err: LocalizedError = original.clone().into();
        assert_eq!(err.to_string(), original.message);
        assert_eq!(err.as_integrity(), Some(&original));
    }
}
