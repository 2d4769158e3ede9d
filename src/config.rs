//! Process-wide configuration for localized fields.
//!
//! Settings are read-mostly: every resolution takes a fresh snapshot through
//! [`settings()`], so a [`reload`] takes effect on the next call without a
//! restart. Tests and administrative code can install a scoped, thread-local
//! override with [`override_settings`].

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, RwLock};

/// A configured language: code plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    pub code: String,
    pub name: String,
}

impl LanguageSpec {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// How the admin presents the per-language breakdown of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Tab,
    Dropdown,
}

impl FromStr for DisplayMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tab" => Ok(DisplayMode::Tab),
            "dropdown" => Ok(DisplayMode::Dropdown),
            other => bail!("Unknown display mode: '{}'", other),
        }
    }
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayMode::Tab => write!(f, "tab"),
            DisplayMode::Dropdown => write!(f, "dropdown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Primary language, used when no explicit or active language applies
    pub language_code: String,

    /// Supported languages in display order
    pub languages: Vec<LanguageSpec>,

    /// Ordered fallback chain per language
    #[serde(default)]
    pub fallbacks: HashMap<String, Vec<String>>,

    /// Upper bound on slug regeneration attempts for a single save
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Admin presentation of per-language values
    #[serde(default)]
    pub display: DisplayMode,

    /// Whether `field__<op>` lookups resolve against the active language
    #[serde(default = "default_register_lookups")]
    pub register_lookups: bool,
}

fn default_max_retries() -> u32 {
    100
}

fn default_register_lookups() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language_code: "en".to_string(),
            languages: vec![LanguageSpec::new("en", "English")],
            fallbacks: HashMap::new(),
            max_retries: default_max_retries(),
            display: DisplayMode::default(),
            register_lookups: default_register_lookups(),
        }
    }
}

impl Settings {
    /// Create settings with a primary language and the supported languages.
    pub fn new<I, C, N>(language_code: impl Into<String>, languages: I) -> Self
    where
        I: IntoIterator<Item = (C, N)>,
        C: Into<String>,
        N: Into<String>,
    {
        Self {
            language_code: language_code.into(),
            languages: languages
                .into_iter()
                .map(|(code, name)| LanguageSpec::new(code, name))
                .collect(),
            ..Default::default()
        }
    }

    /// Set the fallback chain for one language
    pub fn with_fallback<I, S>(mut self, language: impl Into<String>, chain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallbacks
            .insert(language.into(), chain.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_display(mut self, display: DisplayMode) -> Self {
        self.display = display;
        self
    }

    pub fn with_register_lookups(mut self, register_lookups: bool) -> Self {
        self.register_lookups = register_lookups;
        self
    }

    /// Codes of all supported languages, in configured order.
    pub fn language_codes(&self) -> Vec<String> {
        self.languages.iter().map(|l| l.code.clone()).collect()
    }

    pub fn is_supported(&self, code: &str) -> bool {
        self.languages.iter().any(|l| l.code == code)
    }

    pub fn language_name(&self, code: &str) -> Option<&str> {
        self.languages
            .iter()
            .find(|l| l.code == code)
            .map(|l| l.name.as_str())
    }

    /// Configured fallback chain for a language (empty when none is configured).
    pub fn fallbacks_for(&self, code: &str) -> &[String] {
        self.fallbacks.get(code).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Load settings from `LOCALIZED_FIELDS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let language_code = lookup("LOCALIZED_FIELDS_LANGUAGE_CODE")
            .unwrap_or_else(|| defaults.language_code.clone());

        let languages = match lookup("LOCALIZED_FIELDS_LANGUAGES") {
            Some(raw) => parse_languages(&raw).context("Invalid LOCALIZED_FIELDS_LANGUAGES")?,
            None => defaults.languages.clone(),
        };

        let fallbacks = match lookup("LOCALIZED_FIELDS_FALLBACKS") {
            Some(raw) => serde_json::from_str::<HashMap<String, Vec<String>>>(&raw)
                .context("LOCALIZED_FIELDS_FALLBACKS must be a JSON object of language lists")?,
            None => HashMap::new(),
        };

        let max_retries = match lookup("LOCALIZED_FIELDS_MAX_RETRIES") {
            Some(raw) => raw
                .trim()
                .parse()
                .context("LOCALIZED_FIELDS_MAX_RETRIES must be a non-negative integer")?,
            None => defaults.max_retries,
        };

        let display = match lookup("LOCALIZED_FIELDS_DISPLAY") {
            Some(raw) => raw.parse().context("Invalid LOCALIZED_FIELDS_DISPLAY")?,
            None => defaults.display,
        };

        let register_lookups = lookup("LOCALIZED_FIELDS_REGISTER_LOOKUPS")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(defaults.register_lookups);

        let settings = Self {
            language_code,
            languages,
            fallbacks,
            max_retries,
            display,
            register_lookups,
        };
        settings.check()?;
        Ok(settings)
    }

    /// Reject configurations the resolver cannot work with.
    pub fn check(&self) -> Result<()> {
        if self.languages.is_empty() {
            bail!("At least one language must be configured");
        }
        if !self.is_supported(&self.language_code) {
            bail!(
                "Primary language '{}' is not among the configured languages",
                self.language_code
            );
        }
        Ok(())
    }
}

/// Parse `en:English,nl:Dutch` (a bare code uses itself as the name).
fn parse_languages(raw: &str) -> Result<Vec<LanguageSpec>> {
    let mut languages = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (code, name) = match entry.split_once(':') {
            Some((code, name)) => (code.trim(), name.trim()),
            None => (entry, entry),
        };
        if code.is_empty() {
            bail!("Empty language code in '{}'", entry);
        }
        languages.push(LanguageSpec::new(code, name));
    }
    Ok(languages)
}

// ==================== Process-wide handle ====================

static GLOBAL: OnceLock<RwLock<Arc<Settings>>> = OnceLock::new();

thread_local! {
    static OVERRIDES: RefCell<Vec<Arc<Settings>>> = const { RefCell::new(Vec::new()) };
}

fn global() -> &'static RwLock<Arc<Settings>> {
    GLOBAL.get_or_init(|| RwLock::new(Arc::new(Settings::default())))
}

/// Current settings snapshot: the innermost override on this thread, else the global.
pub fn settings() -> Arc<Settings> {
    if let Some(overridden) = OVERRIDES.with(|stack| stack.borrow().last().cloned()) {
        return overridden;
    }
    let guard = global().read().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(&guard)
}

/// Replace the process-wide settings. Takes effect on the next resolution.
pub fn reload(settings: Settings) {
    let mut guard = global().write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = Arc::new(settings);
    tracing::debug!("Localized field settings reloaded");
}

/// Scoped override, restored when dropped.
#[must_use = "the override is removed as soon as the guard is dropped"]
pub struct SettingsGuard {
    _private: (),
}

impl Drop for SettingsGuard {
    fn drop(&mut self) {
        OVERRIDES.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Install `settings` for the current thread until the guard drops.
pub fn override_settings(settings: Settings) -> SettingsGuard {
    OVERRIDES.with(|stack| stack.borrow_mut().push(Arc::new(settings)));
    SettingsGuard { _private: () }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ==================== Defaults ====================

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.language_code, "en");
        assert_eq!(settings.language_codes(), vec!["en"]);
        assert_eq!(settings.max_retries, 100);
        assert_eq!(settings.display, DisplayMode::Tab);
        assert!(settings.register_lookups);
        assert!(settings.fallbacks_for("en").is_empty());
    }

    // ==================== Environment Loading ====================

    #[test]
    fn test_from_lookup_full() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("LOCALIZED_FIELDS_LANGUAGE_CODE", "nl"),
            ("LOCALIZED_FIELDS_LANGUAGES", "en:English, nl:Dutch,de"),
            ("LOCALIZED_FIELDS_FALLBACKS", r#"{"de": ["nl", "en"]}"#),
            ("LOCALIZED_FIELDS_MAX_RETRIES", "7"),
            ("LOCALIZED_FIELDS_DISPLAY", "Dropdown"),
            ("LOCALIZED_FIELDS_REGISTER_LOOKUPS", "false"),
        ]))
        .expect("Should load");

        assert_eq!(settings.language_code, "nl");
        assert_eq!(settings.language_codes(), vec!["en", "nl", "de"]);
        assert_eq!(settings.language_name("de"), Some("de"));
        assert_eq!(settings.fallbacks_for("de"), ["nl", "en"]);
        assert_eq!(settings.max_retries, 7);
        assert_eq!(settings.display, DisplayMode::Dropdown);
        assert!(!settings.register_lookups);
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let settings = Settings::from_lookup(|_| None).expect("Should load");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_from_lookup_rejects_bad_fallbacks() {
        let result = Settings::from_lookup(lookup_from(&[(
            "LOCALIZED_FIELDS_FALLBACKS",
            "nl -> en",
        )]));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_lookup_rejects_unknown_primary() {
        let result = Settings::from_lookup(lookup_from(&[
            ("LOCALIZED_FIELDS_LANGUAGE_CODE", "fr"),
            ("LOCALIZED_FIELDS_LANGUAGES", "en:English"),
        ]));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("fr"));
    }

    #[test]
    fn test_display_mode_parse() {
        assert_eq!("tab".parse::<DisplayMode>().unwrap(), DisplayMode::Tab);
        assert_eq!(" DROPDOWN ".parse::<DisplayMode>().unwrap(), DisplayMode::Dropdown);
        assert!("tabs".parse::<DisplayMode>().is_err());
    }

    // ==================== Overrides ====================

    #[test]
    fn test_override_is_scoped() {
        let custom = Settings::new("nl", [("nl", "Dutch"), ("en", "English")]);
        {
            let _guard = override_settings(custom.clone());
            assert_eq!(settings().language_code, "nl");
            {
                let _inner = override_settings(Settings::default().with_max_retries(3));
                assert_eq!(settings().max_retries, 3);
            }
            assert_eq!(*settings(), custom);
        }
        assert_ne!(settings().language_code, "nl");
    }
}
