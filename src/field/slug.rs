//! Unique, per-language slugs derived from sibling fields.

use super::{LocalizedColumn, LocalizedField, Widget};
use crate::config::{self, Settings};
use crate::error::{IntegrityError, Result};
use crate::model::Instance;
use crate::value::{is_blank, KindTag, LocalizedValue, Raw, Text};
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

static NON_SLUG_CHARS: OnceLock<Regex> = OnceLock::new();
static SEPARATORS: OnceLock<Regex> = OnceLock::new();

/// Lower-case, hyphenated, URL-safe form of `value`.
///
/// Word characters (Unicode-aware), whitespace and hyphens are kept; runs of
/// whitespace and hyphens collapse to one hyphen.
pub fn slugify(value: &str) -> String {
    let non_slug = NON_SLUG_CHARS.get_or_init(|| {
        Regex::new(r"[^\w\s-]").unwrap_or_else(|e| unreachable!("static pattern: {}", e))
    });
    let separators = SEPARATORS.get_or_init(|| {
        Regex::new(r"[-\s]+").unwrap_or_else(|e| unreachable!("static pattern: {}", e))
    });
    let cleaned = non_slug.replace_all(value, "").to_lowercase();
    separators
        .replace_all(&cleaned, "-")
        .trim_matches(|c| c == '-' || c == '_')
        .to_string()
}

type SlugSource = Arc<dyn Fn(&Instance, &str) -> Option<String> + Send + Sync>;

/// Where a slug's text comes from.
#[derive(Clone)]
pub enum PopulateFrom {
    /// Sibling fields, joined with "-" when more than one holds a value
    Fields(Vec<String>),
    /// Function of the instance and the language code
    Func(SlugSource),
}

impl PopulateFrom {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Instance, &str) -> Option<String> + Send + Sync + 'static,
    {
        PopulateFrom::Func(Arc::new(f))
    }
}

impl From<&str> for PopulateFrom {
    fn from(field: &str) -> Self {
        PopulateFrom::Fields(vec![field.to_string()])
    }
}

impl<const N: usize> From<[&str; N]> for PopulateFrom {
    fn from(fields: [&str; N]) -> Self {
        PopulateFrom::Fields(fields.iter().map(|f| f.to_string()).collect())
    }
}

impl From<Vec<String>> for PopulateFrom {
    fn from(fields: Vec<String>) -> Self {
        PopulateFrom::Fields(fields)
    }
}

impl fmt::Debug for PopulateFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopulateFrom::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            PopulateFrom::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Slug keys that conflicted during one save.
///
/// Conflicts accumulate across attempts: once a language has conflicted it
/// keeps its suffix for the rest of the save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlugConflicts {
    count: u32,
    keys: Vec<(String, Option<String>)>,
}

impl SlugConflicts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one violation. A violation without a language covers every
    /// language of its field.
    pub fn record(&mut self, err: &IntegrityError) {
        self.count += 1;
        if let Some(field) = err.field.as_deref() {
            let key = (field.to_string(), err.language.clone());
            if !self.keys.contains(&key) {
                self.keys.push(key);
            }
        }
    }

    /// Number of conflicts seen so far, used as the suffix.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether `language` of `field` has conflicted during this save.
    pub fn affects(&self, field: &str, language: &str) -> bool {
        self.keys.iter().any(|(name, lang)| {
            name == field && lang.as_deref().map(|l| l == language).unwrap_or(true)
        })
    }
}

/// Whether `existing` is `slug` or `slug` plus a numeric suffix this field
/// generates.
fn keeps_existing(existing: &str, slug: &str) -> bool {
    match existing.strip_prefix(slug) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('-')
            .map(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false),
        None => false,
    }
}

/// Localized slug field kept unique per language through save retries.
#[derive(Debug, Clone)]
pub struct UniqueSlugField {
    field: LocalizedField<Text>,
    populate_from: PopulateFrom,
    include_time: bool,
    uniqueness: Option<Vec<String>>,
    enabled: bool,
    immutable: bool,
}

impl UniqueSlugField {
    pub fn new(name: impl Into<String>, populate_from: impl Into<PopulateFrom>) -> Self {
        Self {
            field: LocalizedField::new(name).blank(true),
            populate_from: populate_from.into(),
            include_time: false,
            uniqueness: None,
            enabled: true,
            immutable: false,
        }
    }

    /// Append the sub-second microsecond stamp to every generated slug.
    pub fn include_time(mut self, include_time: bool) -> Self {
        self.include_time = include_time;
        self
    }

    /// Languages covered by the unique constraint (default: every language).
    pub fn uniqueness<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uniqueness = Some(languages.into_iter().map(Into::into).collect());
        self
    }

    /// When disabled the field is a plain editable value and never populated.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Keep an existing slug instead of regenerating it.
    pub fn immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub fn includes_time(&self) -> bool {
        self.include_time
    }

    pub fn populate_from(&self) -> &PopulateFrom {
        &self.populate_from
    }

    pub fn uniqueness_in(&self, settings: &Settings) -> Vec<String> {
        self.uniqueness
            .clone()
            .unwrap_or_else(|| settings.language_codes())
    }

    /// Whether a violation on `language` of this field is a slug conflict.
    pub fn covers(&self, language: Option<&str>) -> bool {
        match language {
            Some(language) => self
                .uniqueness_in(&config::settings())
                .iter()
                .any(|l| l == language),
            None => true,
        }
    }

    /// Source text for one language.
    fn source(&self, instance: &Instance, language: &str) -> Option<String> {
        match &self.populate_from {
            PopulateFrom::Func(f) => f(instance, language),
            PopulateFrom::Fields(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .filter_map(|name| instance.source_text(name, language))
                    .collect();
                (!parts.is_empty()).then(|| parts.join("-"))
            }
        }
    }

    /// Slugs for every configured language, given the instance's current state.
    ///
    /// Languages named in `conflicts` get the conflict count as a suffix.
    /// Every other language of a saved instance keeps its stored slug while
    /// it still matches the source.
    pub fn populate(
        &self,
        instance: &Instance,
        conflicts: &SlugConflicts,
    ) -> Result<LocalizedValue<Raw>> {
        let settings = config::settings();
        let current = instance.localized(self.name())?;
        let mut slugs = LocalizedValue::<Text>::with_settings(&settings).cast::<Raw>();

        for language in settings.language_codes() {
            let existing = current
                .get(&language)
                .filter(|v| !is_blank(v))
                .and_then(Value::as_str)
                .map(str::to_string);

            if self.immutable {
                if let Some(existing) = existing.as_ref() {
                    slugs.set(&language, existing.clone());
                    continue;
                }
            }

            let Some(source) = self.source(instance, &language).filter(|s| !s.is_empty()) else {
                continue;
            };
            let mut slug = slugify(&source);
            let conflicted = conflicts.affects(self.name(), &language);

            if instance.id().is_some() && !conflicted {
                if let Some(existing) = existing.filter(|e| keeps_existing(e, &slug)) {
                    slugs.set(&language, existing);
                    continue;
                }
            }

            if self.include_time {
                slug.push_str(&format!("-{}", Utc::now().timestamp_subsec_micros()));
            }
            if conflicted {
                if !self.include_time {
                    slug.push('-');
                }
                slug.push_str(&conflicts.count().to_string());
            }
            debug!("{}: generated slug '{}' for {}", self.name(), slug, language);
            slugs.set(&language, slug);
        }

        Ok(slugs)
    }

    pub fn inner(&self) -> &LocalizedField<Text> {
        &self.field
    }
}

impl LocalizedColumn for UniqueSlugField {
    fn name(&self) -> &str {
        self.field.name()
    }

    fn kind(&self) -> KindTag {
        KindTag::Text
    }

    fn is_nullable(&self) -> bool {
        self.field.is_null()
    }

    fn is_blank(&self) -> bool {
        self.field.is_blank()
    }

    fn required_languages(&self) -> Vec<String> {
        self.field.required_languages()
    }

    fn widget(&self) -> Widget {
        Widget::HiddenInput
    }

    fn empty_value(&self) -> LocalizedValue<Raw> {
        self.field.empty_value()
    }

    fn load(&self, raw: Option<Value>) -> LocalizedValue<Raw> {
        self.field.load(raw)
    }

    fn prepare(&self, value: &LocalizedValue<Raw>) -> Result<Option<Value>> {
        LocalizedColumn::prepare(&self.field, value)
    }

    fn validate(&self, value: &LocalizedValue<Raw>) -> Result<()> {
        LocalizedColumn::validate(&self.field, value)
    }

    fn decode_projection(&self, raw: Value) -> Value {
        self.field.from_projection(raw)
    }

    fn unique_languages(&self) -> Vec<String> {
        self.uniqueness_in(&config::settings())
    }

    fn as_slug(&self) -> Option<&UniqueSlugField> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{override_settings, SettingsGuard};
    use crate::field::LocalizedCharField;
    use crate::model::Model;
    use serde_json::json;
    use std::sync::Arc;

    fn settings() -> SettingsGuard {
        override_settings(Settings::new("en", [("en", "English"), ("nl", "Dutch")]))
    }

    fn model(slug: UniqueSlugField) -> Arc<Model> {
        Model::builder("Article")
            .field(LocalizedCharField::new("title"))
            .field(LocalizedCharField::new("subtitle").blank(true))
            .field(slug)
            .atomic_slug_retry()
            .build()
    }

    // ==================== slugify ====================

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Many   spaces -- and dashes "), "many-spaces-and-dashes");
        assert_eq!(slugify("Wat is dit?!"), "wat-is-dit");
        assert_eq!(slugify("Ünïcode stays"), "ünïcode-stays");
        assert_eq!(slugify("_edge_"), "edge");
    }

    // ==================== populate ====================

    #[test]
    fn test_populate_per_language() {
        let _guard = settings();
        let model = model(UniqueSlugField::new("slug", "title"));
        let mut instance = model.instance();
        instance
            .set("title", json!({"en": "Hello World", "nl": "Hallo Wereld"}))
            .expect("Should set");

        let slugs = UniqueSlugField::new("slug", "title")
            .populate(&instance, &SlugConflicts::new())
            .expect("Should populate");
        assert_eq!(slugs.get("en"), Some(&json!("hello-world")));
        assert_eq!(slugs.get("nl"), Some(&json!("hallo-wereld")));
    }

    #[test]
    fn test_populate_from_several_fields() {
        let _guard = settings();
        let slug = UniqueSlugField::new("slug", ["title", "subtitle"]);
        let model = model(slug.clone());
        let mut instance = model.instance();
        instance
            .set("title", json!({"en": "First", "nl": "Eerste"}))
            .expect("Should set");
        instance.set("subtitle", json!({"en": "Second"})).expect("Should set");

        let slugs = slug.populate(&instance, &SlugConflicts::new()).expect("Should populate");
        assert_eq!(slugs.get("en"), Some(&json!("first-second")));
        assert_eq!(slugs.get("nl"), Some(&json!("eerste")));
    }

    #[test]
    fn test_populate_from_function() {
        let _guard = settings();
        let slug = UniqueSlugField::new(
            "slug",
            PopulateFrom::func(|instance, language| {
                instance
                    .source_text("title", language)
                    .map(|title| format!("{} {}", language, title))
            }),
        );
        let model = model(slug.clone());
        let mut instance = model.instance();
        instance.set("title", json!({"en": "Title"})).expect("Should set");

        let slugs = slug.populate(&instance, &SlugConflicts::new()).expect("Should populate");
        assert_eq!(slugs.get("en"), Some(&json!("en-title")));
        assert_eq!(slugs.get("nl"), Some(&json!("")));
    }

    #[test]
    fn test_retry_suffix() {
        let _guard = settings();
        let slug = UniqueSlugField::new("slug", "title");
        let model = model(slug.clone());
        let mut instance = model.instance();
        instance.set("title", json!({"en": "Hello World"})).expect("Should set");

        let mut conflicts = SlugConflicts::new();
        conflicts.record(&IntegrityError::unique_language("slug", "en"));
        conflicts.record(&IntegrityError::unique_language("slug", "en"));
        let slugs = slug.populate(&instance, &conflicts).expect("Should populate");
        assert_eq!(slugs.get("en"), Some(&json!("hello-world-2")));
    }

    #[test]
    fn test_retry_suffix_only_for_conflicted_language() {
        let _guard = settings();
        let slug = UniqueSlugField::new("slug", "title");
        let model = model(slug.clone());
        let mut instance = model.instance();
        instance
            .set("title", json!({"en": "Same", "nl": "Twee"}))
            .expect("Should set");

        let mut conflicts = SlugConflicts::new();
        conflicts.record(&IntegrityError::unique_language("slug", "en"));
        let slugs = slug.populate(&instance, &conflicts).expect("Should populate");
        assert_eq!(slugs.get("en"), Some(&json!("same-1")));
        assert_eq!(slugs.get("nl"), Some(&json!("twee")));

        let mut whole_field = SlugConflicts::new();
        whole_field.record(&IntegrityError::unique_column("slug"));
        let slugs = slug.populate(&instance, &whole_field).expect("Should populate");
        assert_eq!(slugs.get("en"), Some(&json!("same-1")));
        assert_eq!(slugs.get("nl"), Some(&json!("twee-1")));
    }

    #[test]
    fn test_conflicts_on_other_fields_leave_slug_alone() {
        let mut conflicts = SlugConflicts::new();
        conflicts.record(&IntegrityError::unique_language("handle", "en"));
        assert_eq!(conflicts.count(), 1);
        assert!(!conflicts.affects("slug", "en"));
        assert!(conflicts.affects("handle", "en"));
        assert!(!conflicts.affects("handle", "nl"));
    }

    #[test]
    fn test_keeps_existing_only_for_numeric_suffix() {
        assert!(keeps_existing("hello", "hello"));
        assert!(keeps_existing("hello-3", "hello"));
        assert!(keeps_existing("hello-1234561", "hello"));
        assert!(!keeps_existing("hello-world", "hello"));
        assert!(!keeps_existing("hello-", "hello"));
        assert!(!keeps_existing("hellos", "hello"));
        assert!(!keeps_existing("hello", "hello-world"));
    }

    #[test]
    fn test_include_time_appends_stamp() {
        let _guard = settings();
        let slug = UniqueSlugField::new("slug", "title").include_time(true);
        let model = model(slug.clone());
        let mut instance = model.instance();
        instance.set("title", json!({"en": "Timed"})).expect("Should set");

        let mut conflicts = SlugConflicts::new();
        conflicts.record(&IntegrityError::unique_language("slug", "en"));
        let slugs = slug.populate(&instance, &conflicts).expect("Should populate");
        let generated = slugs.get("en").and_then(Value::as_str).expect("Should have slug");
        let suffix = generated.strip_prefix("timed-").expect("Should keep prefix");
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
        assert!(suffix.ends_with('1'));
    }

    #[test]
    fn test_immutable_keeps_existing() {
        let _guard = settings();
        let slug = UniqueSlugField::new("slug", "title").immutable(true);
        let model = model(slug.clone());
        let mut instance = model.instance();
        instance.set("title", json!({"en": "New Title"})).expect("Should set");
        instance.set("slug", json!({"en": "original"})).expect("Should set");

        let slugs = slug.populate(&instance, &SlugConflicts::new()).expect("Should populate");
        assert_eq!(slugs.get("en"), Some(&json!("original")));
    }

    #[test]
    fn test_uniqueness_defaults_to_all_languages() {
        let _guard = settings();
        let slug = UniqueSlugField::new("slug", "title");
        assert_eq!(LocalizedColumn::unique_languages(&slug), vec!["en", "nl"]);
        assert!(slug.covers(Some("nl")));

        let english_only = UniqueSlugField::new("slug", "title").uniqueness(["en"]);
        assert!(!english_only.covers(Some("nl")));
        assert!(english_only.covers(None));
    }

    #[test]
    fn test_slug_widget_is_hidden_and_optional() {
        let _guard = settings();
        let slug = UniqueSlugField::new("slug", "title");
        assert_eq!(LocalizedColumn::widget(&slug), Widget::HiddenInput);
        assert!(LocalizedColumn::required_languages(&slug).is_empty());
    }
}
