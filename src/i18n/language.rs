//! Language type: a language code validated against the registry.

use crate::error::{LocalizedError, Result};
use crate::i18n::LanguageRegistry;
use std::fmt;

/// A validated language.
///
/// Only configured languages can be constructed, which makes this the typed
/// accessor for per-language values (`value.get_in(&nl)`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Language {
    code: String,
}

impl Language {
    /// Create a Language from a language code string.
    ///
    /// # Arguments
    /// * `code` - The configured language code (e.g., "en", "nl")
    ///
    /// # Returns
    /// * `Ok(Language)` if the code is configured
    /// * `Err(LocalizedError::UnsupportedLanguage)` otherwise
    pub fn from_code(code: &str) -> Result<Language> {
        if LanguageRegistry::get().is_supported(code) {
            Ok(Language {
                code: code.to_string(),
            })
        } else {
            Err(LocalizedError::UnsupportedLanguage(code.to_string()))
        }
    }

    /// The primary language.
    pub fn primary() -> Language {
        Language {
            code: LanguageRegistry::get().primary().to_string(),
        }
    }

    /// All configured languages, in display order.
    pub fn all() -> Vec<Language> {
        LanguageRegistry::get()
            .codes()
            .into_iter()
            .map(|code| Language { code })
            .collect()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Display name from the registry.
    pub fn name(&self) -> String {
        LanguageRegistry::get().name_of(&self.code).to_string()
    }

    pub fn is_primary(&self) -> bool {
        LanguageRegistry::get().primary() == self.code
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

impl AsRef<str> for Language {
    fn as_ref(&self) -> &str {
        &self.code
    }
}
