//! Language registry: a view over the configured languages.
//!
//! The registry is built from a settings snapshot so a configuration reload
//! is visible to the next registry obtained with [`LanguageRegistry::get`].

use crate::config::{self, LanguageSpec, Settings};
use std::sync::Arc;

/// Configured languages plus the primary language.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    settings: Arc<Settings>,
}

impl LanguageRegistry {
    /// Registry for the current settings.
    pub fn get() -> LanguageRegistry {
        Self::from_settings(config::settings())
    }

    pub fn from_settings(settings: Arc<Settings>) -> LanguageRegistry {
        LanguageRegistry { settings }
    }

    /// Get a language configuration by its code.
    ///
    /// # Arguments
    /// * `code` - The language code (e.g., "en", "nl")
    ///
    /// # Returns
    /// * `Some(&LanguageSpec)` if the language is configured
    /// * `None` otherwise
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageSpec> {
        self.settings.languages.iter().find(|lang| lang.code == code)
    }

    /// All configured languages in display order.
    pub fn list(&self) -> &[LanguageSpec] {
        &self.settings.languages
    }

    pub fn codes(&self) -> Vec<String> {
        self.settings.language_codes()
    }

    /// Code of the primary language.
    pub fn primary(&self) -> &str {
        &self.settings.language_code
    }

    pub fn is_supported(&self, code: &str) -> bool {
        self.get_by_code(code).is_some()
    }

    /// Display name for a language code, or the code itself when unknown.
    pub fn name_of<'a>(&'a self, code: &'a str) -> &'a str {
        self.get_by_code(code)
            .map(|lang| lang.name.as_str())
            .unwrap_or(code)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
