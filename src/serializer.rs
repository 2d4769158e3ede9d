//! REST serialization: a localized field reads as one resolved scalar and
//! accepts either a scalar or a language mapping on write.

use crate::config;
use crate::field::LocalizedColumn;
use crate::model::{Instance, Model};
use crate::resolver;
use crate::value::{is_blank, KindTag, LocalizedValue, Raw};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializerError {
    #[error("This field is required.")]
    Required,

    #[error("A valid value is required for '{language}': must be {expected}.")]
    Invalid {
        language: String,
        expected: &'static str,
    },

    #[error("Expected a value or a mapping of language codes to values.")]
    NotAMapping,

    #[error("Unsupported language code: '{0}'")]
    UnknownLanguage(String),

    #[error("Could not assign the value: {0}")]
    Assignment(String),
}

impl SerializerError {
    pub fn code(&self) -> &'static str {
        match self {
            SerializerError::Required => "required",
            _ => "invalid",
        }
    }
}

/// Errors by field name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid data: {}", describe(.0))]
pub struct ValidationErrors(pub BTreeMap<String, SerializerError>);

fn describe(errors: &BTreeMap<String, SerializerError>) -> String {
    errors
        .iter()
        .map(|(field, err)| format!("{}: {}", field, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Wire shape of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireField {
    Char,
    Integer,
    Float,
    Boolean,
    File,
    Slug,
}

const WIRE_FIELDS: &[(KindTag, WireField)] = &[
    (KindTag::Raw, WireField::Char),
    (KindTag::Text, WireField::Char),
    (KindTag::Integer, WireField::Integer),
    (KindTag::Float, WireField::Float),
    (KindTag::Boolean, WireField::Boolean),
    (KindTag::File, WireField::File),
];

pub fn wire_field_for(column: &dyn LocalizedColumn) -> WireField {
    if column.as_slug().is_some() {
        return WireField::Slug;
    }
    WIRE_FIELDS
        .iter()
        .find(|(tag, _)| *tag == column.kind())
        .map(|(_, wire)| *wire)
        .unwrap_or(WireField::Char)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedSerializerField {
    name: String,
    kind: KindTag,
    wire: WireField,
    required: bool,
    read_only: bool,
}

impl LocalizedSerializerField {
    pub fn new(name: impl Into<String>, kind: KindTag) -> Self {
        Self {
            name: name.into(),
            kind,
            wire: WIRE_FIELDS
                .iter()
                .find(|(tag, _)| *tag == kind)
                .map(|(_, wire)| *wire)
                .unwrap_or(WireField::Char),
            required: true,
            read_only: false,
        }
    }

    /// Serializer field for a declared field. Slug fields are read-only.
    pub fn for_column(column: &dyn LocalizedColumn) -> Self {
        let wire = wire_field_for(column);
        Self {
            name: column.name().to_string(),
            kind: column.kind(),
            wire,
            required: !column.is_blank() && !column.required_languages().is_empty(),
            read_only: wire == WireField::Slug,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wire(&self) -> WireField {
        self.wire
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Resolved value for the active language, coerced to the kind.
    pub fn to_representation(&self, value: &LocalizedValue<Raw>) -> Value {
        resolver::resolve(value, None)
            .map(|raw| self.kind.decode_projection(raw.clone()))
            .unwrap_or(Value::Null)
    }

    fn checked(&self, language: &str, raw: &Value) -> Result<Value, SerializerError> {
        if is_blank(raw) {
            return Ok(self.kind.empty());
        }
        self.kind.prepare(raw).ok_or_else(|| SerializerError::Invalid {
            language: language.to_string(),
            expected: self.kind.expected(),
        })
    }

    /// Container for a submitted value.
    ///
    /// A mapping sets every language it names; any other scalar sets the
    /// active language.
    pub fn to_internal_value(&self, data: &Value) -> Result<LocalizedValue<Raw>, SerializerError> {
        let settings = config::settings();
        let mut container = LocalizedValue::<Raw>::with_settings(&settings);
        match data {
            Value::Array(_) => return Err(SerializerError::NotAMapping),
            Value::Object(map) => {
                for (language, raw) in map {
                    if !settings.is_supported(language) {
                        return Err(SerializerError::UnknownLanguage(language.clone()));
                    }
                    container.set(language, self.checked(language, raw)?);
                }
            }
            Value::Null => {}
            scalar => {
                let language = resolver::target_language(&settings, None);
                container.set(&language, self.checked(&language, scalar)?);
            }
        }
        if self.required && container.is_empty() {
            return Err(SerializerError::Required);
        }
        Ok(container)
    }
}

/// Serializer for a whole model: every localized field through
/// [`LocalizedSerializerField`], plain columns as-is.
#[derive(Debug, Clone)]
pub struct ModelSerializer {
    model: Arc<Model>,
    fields: Vec<LocalizedSerializerField>,
    include: Option<Vec<String>>,
}

impl ModelSerializer {
    pub fn new(model: Arc<Model>) -> Self {
        let fields = model
            .localized_fields()
            .iter()
            .map(|f| LocalizedSerializerField::for_column(f.as_ref()))
            .collect();
        Self {
            model,
            fields,
            include: None,
        }
    }

    /// Restrict output and input to these names (`id` included).
    pub fn only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(names.into_iter().map(Into::into).collect());
        self
    }

    fn includes(&self, name: &str) -> bool {
        self.include
            .as_ref()
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(true)
    }

    pub fn field(&self, name: &str) -> Option<&LocalizedSerializerField> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn to_representation(&self, instance: &Instance) -> Map<String, Value> {
        let mut data = Map::new();
        if self.includes("id") {
            data.insert(
                "id".to_string(),
                instance.id().map(Value::from).unwrap_or(Value::Null),
            );
        }
        for field in self.fields.iter().filter(|f| self.includes(f.name())) {
            let value = instance
                .localized(field.name())
                .map(|v| field.to_representation(v))
                .unwrap_or(Value::Null);
            data.insert(field.name().to_string(), value);
        }
        for column in self.model.columns().iter().filter(|c| self.includes(&c.name)) {
            let value = instance.column(&column.name).cloned().unwrap_or(Value::Null);
            data.insert(column.name.clone(), value);
        }
        data
    }

    /// Validate submitted data and build a new, unsaved instance.
    pub fn build(&self, data: &Value) -> Result<Instance, ValidationErrors> {
        let mut instance = self.model.instance();
        self.apply(&mut instance, data)?;
        Ok(instance)
    }

    /// Validate submitted data and assign it to `instance`.
    ///
    /// Read-only fields are ignored. A missing required field is an error
    /// on create; on update (the instance has an id) missing fields are left
    /// untouched.
    pub fn apply(&self, instance: &mut Instance, data: &Value) -> Result<(), ValidationErrors> {
        let mut errors = BTreeMap::new();
        let Some(object) = data.as_object() else {
            errors.insert("non_field_errors".to_string(), SerializerError::NotAMapping);
            return Err(ValidationErrors(errors));
        };
        let partial = instance.id().is_some();

        for field in self.fields.iter().filter(|f| self.includes(f.name())) {
            if field.is_read_only() {
                continue;
            }
            let Some(raw) = object.get(field.name()) else {
                if field.is_required() && !partial {
                    errors.insert(field.name().to_string(), SerializerError::Required);
                }
                continue;
            };
            match field.to_internal_value(raw) {
                Ok(container) => {
                    if let Err(err) = instance.set(field.name(), container) {
                        errors.insert(
                            field.name().to_string(),
                            SerializerError::Assignment(err.to_string()),
                        );
                    }
                }
                Err(err) => {
                    errors.insert(field.name().to_string(), err);
                }
            }
        }

        for column in self.model.columns().iter().filter(|c| self.includes(&c.name)) {
            if let Some(value) = object.get(&column.name) {
                if let Err(err) = instance.set(&column.name, value.clone()) {
                    errors.insert(
                        column.name.clone(),
                        SerializerError::Assignment(err.to_string()),
                    );
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{override_settings, Settings, SettingsGuard};
    use crate::field::{
        LocalizedBooleanField, LocalizedCharField, LocalizedFloatField, LocalizedIntegerField,
        LocalizedTextField, UniqueSlugField,
    };
    use crate::i18n::override_language;
    use crate::value::{Boolean, Float, Integer, Text};
    use serde_json::json;

    fn settings() -> SettingsGuard {
        override_settings(Settings::new(
            "en",
            [("en", "English"), ("nl", "Dutch"), ("fr", "French")],
        ))
    }

    fn article() -> Arc<Model> {
        Model::builder("Article")
            .field(LocalizedCharField::new("title"))
            .field(LocalizedTextField::new("content").blank(true))
            .field(LocalizedFloatField::new("rating").blank(true).null(true))
            .field(LocalizedIntegerField::new("views").blank(true).null(true))
            .field(LocalizedBooleanField::new("published").blank(true).null(true))
            .field(UniqueSlugField::new("slug", "title"))
            .atomic_slug_retry()
            .build()
    }

    // ==================== Field Mapping ====================

    #[test]
    fn test_wire_fields_by_kind() {
        let _guard = settings();
        let serializer = ModelSerializer::new(article());
        let wire = |name: &str| serializer.field(name).expect("Should exist").wire();
        assert_eq!(wire("title"), WireField::Char);
        assert_eq!(wire("content"), WireField::Char);
        assert_eq!(wire("rating"), WireField::Float);
        assert_eq!(wire("views"), WireField::Integer);
        assert_eq!(wire("published"), WireField::Boolean);
        assert_eq!(wire("slug"), WireField::Slug);
        assert!(serializer.field("slug").expect("slug").is_read_only());
    }

    // ==================== Serialization ====================

    #[test]
    fn test_serializes_active_language() {
        let _guard = settings();
        let model = article();
        let mut instance = model.instance();
        instance
            .set("title", json!({"en": "English Title", "nl": "Dutch Title"}))
            .expect("Should set");
        instance.set("rating", json!({"en": 4.5, "nl": 3.5})).expect("Should set");
        instance.set("views", json!({"en": 100, "nl": 50})).expect("Should set");
        instance
            .set("published", json!({"en": true, "nl": false}))
            .expect("Should set");
        let serializer = ModelSerializer::new(model);

        {
            let _lang = override_language("en");
            let data = serializer.to_representation(&instance);
            assert_eq!(data["title"], json!("English Title"));
            assert_eq!(data["rating"], json!(4.5));
            assert_eq!(data["views"], json!(100));
            assert_eq!(data["published"], json!(true));
        }
        {
            let _lang = override_language("nl");
            let data = serializer.to_representation(&instance);
            assert_eq!(data["title"], json!("Dutch Title"));
            assert_eq!(data["views"], json!(50));
            assert_eq!(data["published"], json!(false));
        }
    }

    #[test]
    fn test_serializes_missing_values_as_null() {
        let _guard = settings();
        let model = article();
        let mut instance = model.instance();
        instance.set("title", json!({"en": "Title"})).expect("Should set");
        let data = ModelSerializer::new(model).to_representation(&instance);
        assert_eq!(data["rating"], Value::Null);
        assert_eq!(data["views"], Value::Null);
        assert_eq!(data["id"], Value::Null);
    }

    // ==================== Deserialization ====================

    #[test]
    fn test_accepts_mapping() {
        let _guard = settings();
        let serializer = ModelSerializer::new(article());
        let instance = serializer
            .build(&json!({
                "title": {"en": "English Title", "nl": "Dutch Title"},
                "views": {"en": 100, "nl": "50", "fr": 75},
                "rating": {"en": 19.99},
                "published": {"en": true, "nl": false}
            }))
            .expect("Should be valid");
        let title = instance.get::<Text>("title").expect("title");
        assert_eq!(title.get_typed("nl").as_deref(), Some("Dutch Title"));
        let views = instance.get::<Integer>("views").expect("views");
        assert_eq!(views.get_typed("nl"), Some(50));
        assert_eq!(views.get_typed("fr"), Some(75));
        assert_eq!(
            instance.get::<Float>("rating").expect("rating").get_typed("en"),
            Some(19.99)
        );
        assert_eq!(
            instance.get::<Boolean>("published").expect("published").get_typed("nl"),
            Some(false)
        );
    }

    #[test]
    fn test_accepts_plain_scalar_for_active_language() {
        let _guard = settings();
        let _lang = override_language("nl");
        let serializer = ModelSerializer::new(article());
        let instance = serializer
            .build(&json!({"title": "Alleen Nederlands"}))
            .expect("Should be valid");
        let title = instance.get::<Text>("title").expect("title");
        assert_eq!(title.get_typed("nl").as_deref(), Some("Alleen Nederlands"));
    }

    #[test]
    fn test_missing_required_field() {
        let _guard = settings();
        let serializer = ModelSerializer::new(article());
        let errors = serializer.build(&json!({"content": "x"})).unwrap_err();
        assert_eq!(errors.0.get("title"), Some(&SerializerError::Required));
        assert!(!errors.0.contains_key("content"));
    }

    #[test]
    fn test_typed_validation_errors() {
        let _guard = settings();
        let serializer = ModelSerializer::new(article());
        let errors = serializer
            .build(&json!({"title": "T", "views": {"en": "lots"}, "published": {"en": "maybe"}}))
            .unwrap_err();
        assert_eq!(errors.0["views"].code(), "invalid");
        assert!(errors.0["views"].to_string().contains("an integer"));
        assert!(errors.0["published"].to_string().contains("a boolean"));
    }

    #[test]
    fn test_rejects_unknown_language_and_lists() {
        let _guard = settings();
        let field = LocalizedSerializerField::new("title", KindTag::Text);
        assert_eq!(
            field.to_internal_value(&json!({"xx": "?"})),
            Err(SerializerError::UnknownLanguage("xx".to_string()))
        );
        assert_eq!(
            field.to_internal_value(&json!(["a"])),
            Err(SerializerError::NotAMapping)
        );
    }

    #[test]
    fn test_assignment_failure_is_reported() {
        let _guard = settings();
        let serializer = ModelSerializer::new(article());
        let note = Model::builder("Note")
            .field(LocalizedTextField::new("content").blank(true))
            .build();
        let mut instance = note.instance();
        let errors = serializer
            .apply(&mut instance, &json!({"title": "T", "content": "Body"}))
            .unwrap_err();
        assert!(matches!(errors.0.get("title"), Some(SerializerError::Assignment(_))));
        assert_eq!(errors.0["title"].code(), "invalid");
        assert!(!errors.0.contains_key("content"));
    }

    #[test]
    fn test_slug_input_is_ignored() {
        let _guard = settings();
        let serializer = ModelSerializer::new(article());
        let instance = serializer
            .build(&json!({"title": "T", "slug": {"en": "custom"}}))
            .expect("Should be valid");
        assert!(instance.localized("slug").expect("slug").is_empty());
    }
}
