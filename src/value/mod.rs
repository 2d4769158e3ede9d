//! The localized value container: one logical attribute, many language variants.

mod file;
mod kind;

pub use file::{FieldFile, FileStorage, FileSystemStorage};
pub use kind::{is_blank, Boolean, File, Float, Integer, KindTag, Raw, Text, ValueKind};

use crate::config::{self, Settings};
use crate::i18n::Language;
use crate::query::Expr;
use crate::resolver;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Index;

static NULL: Value = Value::Null;

/// Mapping from language code to a value of kind `K`.
///
/// Every configured language is present (possibly holding the kind's empty
/// sentinel). Unknown codes are kept as given. Languages may instead hold a
/// deferred [`Expr`], which is evaluated by the store at write time and never
/// coerced here.
pub struct LocalizedValue<K: ValueKind = Raw> {
    values: BTreeMap<String, Value>,
    deferred: BTreeMap<String, Expr>,
    kind: PhantomData<K>,
}

pub type LocalizedStringValue = LocalizedValue<Text>;
pub type LocalizedIntegerValue = LocalizedValue<Integer>;
pub type LocalizedFloatValue = LocalizedValue<Float>;
pub type LocalizedBooleanValue = LocalizedValue<Boolean>;
pub type LocalizedFileValue = LocalizedValue<File>;

impl<K: ValueKind> LocalizedValue<K> {
    /// Container with the empty sentinel for every configured language.
    pub fn new() -> Self {
        Self::with_settings(&config::settings())
    }

    pub fn with_settings(settings: &Settings) -> Self {
        let values = settings
            .languages
            .iter()
            .map(|lang| (lang.code.clone(), K::TAG.empty()))
            .collect();
        Self {
            values,
            deferred: BTreeMap::new(),
            kind: PhantomData,
        }
    }

    /// Container from a language mapping.
    pub fn from_map<I, S, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let mut value = Self::new();
        for (language, v) in entries {
            value.values.insert(language.into(), v.into());
        }
        value
    }

    /// Container holding `scalar` under the primary language only.
    pub fn from_scalar(scalar: impl Into<Value>) -> Self {
        let settings = config::settings();
        let mut value = Self::with_settings(&settings);
        value.values.insert(settings.language_code.clone(), scalar.into());
        value
    }

    /// Container from any JSON shape.
    ///
    /// Objects are language mappings, arrays have every element interpreted in
    /// turn, null is the empty container and any other scalar belongs to the
    /// primary language.
    pub fn from_json(json: Value) -> Self {
        let settings = config::settings();
        let mut value = Self::with_settings(&settings);
        value.interpret(json, &settings);
        value
    }

    /// Container built from the mapping returned by `build`, invoked immediately.
    pub fn from_fn<F>(build: F) -> Self
    where
        F: FnOnce() -> Value,
    {
        Self::from_json(build())
    }

    fn interpret(&mut self, json: Value, settings: &Settings) {
        match json {
            Value::Null => {}
            Value::Object(map) => {
                for (language, v) in map {
                    self.deferred.remove(&language);
                    self.values.insert(language, v);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.interpret(item, settings);
                }
            }
            scalar => {
                self.values.insert(settings.language_code.clone(), scalar);
            }
        }
    }

    /// Stored value for `language`; `None` when absent or null.
    pub fn get(&self, language: &str) -> Option<&Value> {
        self.values.get(language).filter(|v| !v.is_null())
    }

    /// Stored value for the primary language.
    pub fn get_primary(&self) -> Option<&Value> {
        self.get(&config::settings().language_code)
    }

    pub fn get_or<'a>(&'a self, language: &str, default: &'a Value) -> &'a Value {
        self.get(language).unwrap_or(default)
    }

    /// Stored value for `language`, coerced to the kind's scalar.
    pub fn get_typed(&self, language: &str) -> Option<K::Scalar> {
        self.get(language).and_then(K::coerce)
    }

    /// Store `value` under `language`. No validation happens here.
    pub fn set(&mut self, language: &str, value: impl Into<Value>) -> &mut Self {
        self.deferred.remove(language);
        self.values.insert(language.to_string(), value.into());
        self
    }

    /// Store a deferred expression under `language`.
    pub fn set_expression(&mut self, language: &str, expr: Expr) -> &mut Self {
        self.values.remove(language);
        self.deferred.insert(language.to_string(), expr);
        self
    }

    pub fn get_in(&self, language: &Language) -> Option<&Value> {
        self.get(language.code())
    }

    pub fn set_in(&mut self, language: &Language, value: impl Into<Value>) -> &mut Self {
        self.set(language.code(), value)
    }

    /// True iff every stored value is blank and nothing is deferred.
    pub fn is_empty(&self) -> bool {
        self.deferred.is_empty() && self.values.values().all(is_blank)
    }

    /// Resolve for the active language (or primary) through the fallback chain.
    pub fn translate(&self) -> Option<K::Scalar> {
        resolver::translate(self, None)
    }

    /// Resolve for an explicit language through its fallback chain.
    pub fn translate_to(&self, language: &str) -> Option<K::Scalar> {
        resolver::translate(self, Some(language))
    }

    /// Same data viewed as another kind.
    pub fn cast<J: ValueKind>(&self) -> LocalizedValue<J> {
        LocalizedValue {
            values: self.values.clone(),
            deferred: self.deferred.clone(),
            kind: PhantomData,
        }
    }

    pub fn deferred(&self) -> &BTreeMap<String, Expr> {
        &self.deferred
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.values.clone()
    }

    /// The container as a JSON object (deferred entries excluded).
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn kind(&self) -> KindTag {
        K::TAG
    }
}

impl LocalizedValue<Boolean> {
    /// Translated value, `false` when nothing resolves.
    pub fn is_true(&self) -> bool {
        self.translate().unwrap_or(false)
    }
}

impl LocalizedValue<Integer> {
    pub fn as_i64(&self) -> i64 {
        self.translate().unwrap_or(0)
    }
}

impl LocalizedValue<Float> {
    pub fn as_f64(&self) -> f64 {
        self.translate().unwrap_or(0.0)
    }
}

impl<K: ValueKind> Default for LocalizedValue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ValueKind> Clone for LocalizedValue<K> {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            deferred: self.deferred.clone(),
            kind: PhantomData,
        }
    }
}

impl<K: ValueKind> fmt::Debug for LocalizedValue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("LocalizedValue");
        s.field("kind", &K::TAG).field("values", &self.values);
        if !self.deferred.is_empty() {
            s.field("deferred", &self.deferred);
        }
        s.finish()
    }
}

impl<K: ValueKind> PartialEq for LocalizedValue<K> {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values && self.deferred == other.deferred
    }
}

impl<K: ValueKind> PartialEq<&str> for LocalizedValue<K> {
    fn eq(&self, other: &&str) -> bool {
        self.to_string() == *other
    }
}

impl<K: ValueKind> PartialEq<str> for LocalizedValue<K> {
    fn eq(&self, other: &str) -> bool {
        self.to_string() == other
    }
}

/// The translated value, or the empty string when nothing resolves.
impl<K: ValueKind> fmt::Display for LocalizedValue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match resolver::resolve(self, None) {
            Some(Value::String(s)) => f.write_str(s),
            Some(other) => write!(f, "{}", other),
            None => Ok(()),
        }
    }
}

impl<K: ValueKind> Index<&str> for LocalizedValue<K> {
    type Output = Value;

    fn index(&self, language: &str) -> &Value {
        self.values.get(language).unwrap_or(&NULL)
    }
}

impl<K: ValueKind> From<BTreeMap<String, Value>> for LocalizedValue<K> {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::from_map(map)
    }
}

impl<K: ValueKind> Serialize for LocalizedValue<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl<'de, K: ValueKind> Deserialize<'de> for LocalizedValue<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{override_settings, SettingsGuard};
    use crate::i18n::override_language;
    use serde_json::json;

    fn settings() -> SettingsGuard {
        override_settings(
            Settings::new(
                "en",
                [("en", "English"), ("nl", "Dutch"), ("fr", "French"), ("de", "German")],
            )
            .with_fallback("nl", ["en"])
            .with_fallback("fr", ["en"]),
        )
    }

    // ==================== Construction ====================

    #[test]
    fn test_new_has_every_language() {
        let _guard = settings();
        let value = LocalizedValue::<Raw>::new();
        for code in ["en", "nl", "fr", "de"] {
            assert_eq!(value[code], Value::Null);
            assert_eq!(value.get(code), None);
        }
        assert!(value.is_empty());
    }

    #[test]
    fn test_string_value_defaults_to_empty_string() {
        let _guard = settings();
        let value = LocalizedStringValue::new();
        assert_eq!(value.get("en"), Some(&json!("")));
        assert!(value.is_empty());
    }

    #[test]
    fn test_from_map_keeps_unknown_languages() {
        let _guard = settings();
        let value = LocalizedValue::<Raw>::from_map([("en", "Hello"), ("xx", "Unknown")]);
        assert_eq!(value.get("en"), Some(&json!("Hello")));
        assert_eq!(value.get("xx"), Some(&json!("Unknown")));
        assert_eq!(value.get("nl"), None);
    }

    #[test]
    fn test_from_scalar_sets_primary_only() {
        let _guard = settings();
        let value = LocalizedStringValue::from_scalar("Hello");
        assert_eq!(value.get("en"), Some(&json!("Hello")));
        assert_eq!(value.get("nl"), Some(&json!("")));
    }

    #[test]
    fn test_from_json_shapes() {
        let _guard = settings();
        let mapping = LocalizedValue::<Raw>::from_json(json!({"en": "a", "nl": "b"}));
        assert_eq!(mapping.get("nl"), Some(&json!("b")));

        let single = LocalizedValue::<Raw>::from_json(json!(["lone"]));
        assert_eq!(single.get("en"), Some(&json!("lone")));

        let none = LocalizedValue::<Raw>::from_json(json!([]));
        assert!(none.is_empty());

        let null = LocalizedValue::<Raw>::from_json(Value::Null);
        assert!(null.is_empty());
    }

    #[test]
    fn test_from_fn_invoked_immediately() {
        let _guard = settings();
        let value = LocalizedValue::<Raw>::from_fn(|| json!({"en": "built", "fr": "construit"}));
        assert_eq!(value.get("fr"), Some(&json!("construit")));
    }

    #[test]
    fn test_deferred_expression_is_not_coerced() {
        let _guard = settings();
        let mut value = LocalizedIntegerValue::new();
        value.set("en", 1).set_expression("nl", Expr::Column("other".to_string()));
        assert_eq!(value.get("nl"), None);
        assert_eq!(value.deferred().get("nl"), Some(&Expr::Column("other".to_string())));
        assert!(!value.is_empty());
    }

    // ==================== get / set ====================

    #[test]
    fn test_set_is_chainable() {
        let _guard = settings();
        let mut value = LocalizedValue::<Raw>::new();
        value.set("en", "one").set("nl", "een");
        assert_eq!(value.get("en"), Some(&json!("one")));
        assert_eq!(value.get("nl"), Some(&json!("een")));
    }

    #[test]
    fn test_get_or_default() {
        let _guard = settings();
        let value = LocalizedValue::<Raw>::new();
        let default = json!("fallback");
        assert_eq!(value.get_or("en", &default), &default);
    }

    #[test]
    fn test_get_in_with_language() {
        let _guard = settings();
        let mut value = LocalizedValue::<Raw>::new();
        let dutch = Language::from_code("nl").expect("Should be configured");
        value.set_in(&dutch, "hallo");
        assert_eq!(value.get_in(&dutch), Some(&json!("hallo")));
    }

    #[test]
    fn test_raw_get_preserves_stored_string() {
        let _guard = settings();
        let value = LocalizedIntegerValue::from_map([("en", "123")]);
        assert_eq!(value.get("en"), Some(&json!("123")));
        assert_eq!(value.get_typed("en"), Some(123));
    }

    // ==================== Emptiness ====================

    #[test]
    fn test_zero_and_false_are_not_empty() {
        let _guard = settings();
        assert!(!LocalizedIntegerValue::from_map([("en", 0)]).is_empty());
        assert!(!LocalizedBooleanValue::from_map([("en", false)]).is_empty());
    }

    // ==================== Conveniences ====================

    #[test]
    fn test_display_and_str_equality() {
        let _guard = settings();
        let _lang = override_language("nl");
        let value = LocalizedStringValue::from_map([("en", "News")]);
        assert_eq!(value.to_string(), "News");
        assert!(value == "News");
    }

    #[test]
    fn test_display_empty() {
        let _guard = settings();
        assert_eq!(LocalizedStringValue::new().to_string(), "");
    }

    #[test]
    fn test_structural_equality() {
        let _guard = settings();
        let a = LocalizedValue::<Raw>::from_map([("en", "x"), ("nl", "y")]);
        let b = LocalizedValue::<Raw>::from_json(json!({"nl": "y", "en": "x"}));
        assert_eq!(a, b);
        assert_ne!(a, LocalizedValue::<Raw>::from_map([("en", "x")]));
    }

    #[test]
    fn test_typed_conveniences() {
        let _guard = settings();
        let _lang = override_language("en");
        assert!(LocalizedBooleanValue::from_map([("en", true)]).is_true());
        assert!(!LocalizedBooleanValue::new().is_true());
        assert_eq!(LocalizedIntegerValue::from_map([("en", 42)]).as_i64(), 42);
        assert_eq!(LocalizedIntegerValue::new().as_i64(), 0);
        assert_eq!(LocalizedFloatValue::from_map([("en", 2.5)]).as_f64(), 2.5);
    }

    #[test]
    fn test_serde_round_trip() {
        let _guard = settings();
        let value = LocalizedStringValue::from_map([("en", "Hi"), ("nl", "Hoi")]);
        let encoded = serde_json::to_string(&value).expect("Should serialize");
        let decoded: LocalizedStringValue = serde_json::from_str(&encoded).expect("Should parse");
        assert_eq!(decoded, value);
    }
}
