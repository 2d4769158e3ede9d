//! Field declarations: conversion between stored documents and containers,
//! required-language validation and per-kind type checks.

mod file;
mod slug;

pub use file::{LocalizedFileField, UploadTo};
pub use slug::{slugify, PopulateFrom, SlugConflicts, UniqueSlugField};

use crate::config::{self, Settings};
use crate::error::{LocalizedError, Result};
use crate::value::{is_blank, Boolean, Float, Integer, KindTag, LocalizedValue, Raw, Text, ValueKind};
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;

/// Which languages must hold a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Required {
    All,
    Nothing,
    Languages(Vec<String>),
}

impl From<bool> for Required {
    fn from(required: bool) -> Self {
        if required {
            Required::All
        } else {
            Required::Nothing
        }
    }
}

impl<S: Into<String>> From<Vec<S>> for Required {
    fn from(languages: Vec<S>) -> Self {
        Required::Languages(languages.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Required {
    fn from(languages: [S; N]) -> Self {
        Required::Languages(languages.into_iter().map(Into::into).collect())
    }
}

/// Input widget used by the form adapter for each language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Widget {
    TextInput,
    Textarea,
    NumberInput,
    CheckboxInput,
    FileInput,
    HiddenInput,
}

/// Result of reading a stored column.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<K: ValueKind> {
    Value(LocalizedValue<K>),
    /// Several documents, as produced by aggregating queries.
    List(Vec<LocalizedValue<K>>),
}

/// A localized field of kind `K`.
pub struct LocalizedField<K: ValueKind = Raw> {
    name: String,
    blank: bool,
    null: bool,
    required: Option<Required>,
    multiline: bool,
    kind: PhantomData<K>,
}

pub type LocalizedCharField = LocalizedField<Text>;
pub type LocalizedIntegerField = LocalizedField<Integer>;
pub type LocalizedFloatField = LocalizedField<Float>;
pub type LocalizedBooleanField = LocalizedField<Boolean>;

impl<K: ValueKind> LocalizedField<K> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blank: false,
            null: false,
            required: None,
            multiline: false,
            kind: PhantomData,
        }
    }

    pub fn blank(mut self, blank: bool) -> Self {
        self.blank = blank;
        self
    }

    pub fn null(mut self, null: bool) -> Self {
        self.null = null;
        self
    }

    /// Explicit requirement; takes precedence over `blank`.
    pub fn required(mut self, required: impl Into<Required>) -> Self {
        self.required = Some(required.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_blank(&self) -> bool {
        self.blank
    }

    pub fn is_null(&self) -> bool {
        self.null
    }

    /// The explicit requirement, if one was given.
    pub fn explicit_required(&self) -> Option<&Required> {
        self.required.as_ref()
    }

    /// Languages that must hold a value under the current settings.
    pub fn required_languages(&self) -> Vec<String> {
        self.required_languages_in(&config::settings())
    }

    pub fn required_languages_in(&self, settings: &Settings) -> Vec<String> {
        match &self.required {
            Some(Required::All) => settings.language_codes(),
            Some(Required::Nothing) => Vec::new(),
            Some(Required::Languages(languages)) => languages.clone(),
            None if self.blank => Vec::new(),
            None => vec![settings.language_code.clone()],
        }
    }

    pub fn widget(&self) -> Widget {
        match K::TAG {
            KindTag::Text if self.multiline => Widget::Textarea,
            KindTag::Raw | KindTag::Text => Widget::TextInput,
            KindTag::Integer | KindTag::Float => Widget::NumberInput,
            KindTag::Boolean => Widget::CheckboxInput,
            KindTag::File => Widget::FileInput,
        }
    }

    /// Load path: stored document to container(s).
    ///
    /// Accepts a native object, JSON text of an object or list, any other
    /// scalar (primary language), or a list of documents. Null stays `None`.
    pub fn from_db_value(&self, raw: Option<Value>) -> Option<Loaded<K>> {
        match raw? {
            Value::Null => None,
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(parsed @ (Value::Object(_) | Value::Array(_))) => self.from_db_value(Some(parsed)),
                _ => Some(Loaded::Value(LocalizedValue::from_scalar(text))),
            },
            Value::Array(items) => Some(Loaded::List(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(text) => self.to_python(Some(Value::String(text))),
                        other => LocalizedValue::from_json(other),
                    })
                    .collect(),
            )),
            other => Some(Loaded::Value(LocalizedValue::from_json(other))),
        }
    }

    /// Load path for a value read through a per-language key projection.
    pub fn from_projection(&self, raw: Value) -> Value {
        K::TAG.decode_projection(raw)
    }

    /// Always yields a container: `None` is empty, JSON text of an object is
    /// a mapping and any other text belongs to the primary language.
    pub fn to_python(&self, value: Option<Value>) -> LocalizedValue<K> {
        match value {
            None | Some(Value::Null) => LocalizedValue::new(),
            Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(parsed @ Value::Object(_)) => LocalizedValue::from_json(parsed),
                _ => LocalizedValue::from_scalar(text),
            },
            Some(other) => LocalizedValue::from_json(other),
        }
    }

    /// Save path: container to stored document, checking every value's kind.
    ///
    /// Deferred expressions are left out; the repository evaluates them.
    pub fn get_prep_value(&self, value: Option<&LocalizedValue<K>>) -> Result<Option<Value>> {
        let Some(value) = value else {
            return Ok(None);
        };
        let mut document = Map::new();
        for (language, v) in value.iter() {
            let prepared = K::TAG
                .prepare(v)
                .ok_or_else(|| LocalizedError::ValueKind {
                    language: language.to_string(),
                    expected: K::TAG.expected(),
                })?;
            document.insert(language.to_string(), prepared);
        }
        Ok(Some(Value::Object(document)))
    }

    /// Check required languages.
    ///
    /// An empty container passes when the column is nullable.
    pub fn validate(&self, value: &LocalizedValue<K>) -> Result<()> {
        if self.null && value.is_empty() {
            return Ok(());
        }
        let missing: Vec<String> = self
            .required_languages()
            .into_iter()
            .filter(|language| {
                value.get(language).map(is_blank).unwrap_or(true)
                    && !value.deferred().contains_key(language)
            })
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LocalizedError::RequiredLanguageMissing {
                field: self.name.clone(),
                languages: missing,
            })
        }
    }

    /// Validate, mapping an all-null container on a nullable field to `None`.
    pub fn clean(&self, value: Option<LocalizedValue<K>>) -> Result<Option<LocalizedValue<K>>> {
        let Some(value) = value else {
            return Ok(None);
        };
        let all_null = value.deferred().is_empty() && value.iter().all(|(_, v)| v.is_null());
        if all_null && self.null {
            return Ok(None);
        }
        self.validate(&value)?;
        Ok(Some(value))
    }
}

impl LocalizedField<Text> {
    /// String field edited with a multi-line widget.
    pub fn multiline(name: impl Into<String>) -> Self {
        let mut field = Self::new(name);
        field.multiline = true;
        field
    }
}

/// Multi-line string field.
pub struct LocalizedTextField;

impl LocalizedTextField {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(name: impl Into<String>) -> LocalizedField<Text> {
        LocalizedField::multiline(name)
    }
}

impl<K: ValueKind> Clone for LocalizedField<K> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            blank: self.blank,
            null: self.null,
            required: self.required.clone(),
            multiline: self.multiline,
            kind: PhantomData,
        }
    }
}

impl<K: ValueKind> fmt::Debug for LocalizedField<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalizedField")
            .field("name", &self.name)
            .field("kind", &K::TAG)
            .field("blank", &self.blank)
            .field("null", &self.null)
            .field("required", &self.required)
            .finish()
    }
}

/// Object-safe view of a localized field, used by models, stores and adapters.
///
/// Containers cross this boundary as `LocalizedValue<Raw>`; implementations
/// apply their own kind.
pub trait LocalizedColumn: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> KindTag;

    fn is_nullable(&self) -> bool;

    fn is_blank(&self) -> bool;

    fn required_languages(&self) -> Vec<String>;

    fn widget(&self) -> Widget;

    /// Fresh container with the kind's empty sentinels.
    fn empty_value(&self) -> LocalizedValue<Raw>;

    /// Stored document to container; never fails.
    fn load(&self, raw: Option<Value>) -> LocalizedValue<Raw>;

    /// Container to stored document, or `None` for a nullable empty value.
    fn prepare(&self, value: &LocalizedValue<Raw>) -> Result<Option<Value>>;

    fn validate(&self, value: &LocalizedValue<Raw>) -> Result<()>;

    fn decode_projection(&self, raw: Value) -> Value;

    /// Languages covered by a per-language unique constraint.
    fn unique_languages(&self) -> Vec<String> {
        Vec::new()
    }

    fn as_slug(&self) -> Option<&UniqueSlugField> {
        None
    }

    fn as_file(&self) -> Option<&LocalizedFileField> {
        None
    }
}

impl<K: ValueKind> LocalizedColumn for LocalizedField<K> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> KindTag {
        K::TAG
    }

    fn is_nullable(&self) -> bool {
        self.null
    }

    fn is_blank(&self) -> bool {
        self.blank
    }

    fn required_languages(&self) -> Vec<String> {
        LocalizedField::required_languages(self)
    }

    fn widget(&self) -> Widget {
        LocalizedField::widget(self)
    }

    fn empty_value(&self) -> LocalizedValue<Raw> {
        LocalizedValue::<K>::new().cast()
    }

    fn load(&self, raw: Option<Value>) -> LocalizedValue<Raw> {
        match self.from_db_value(raw) {
            Some(Loaded::Value(value)) => value.cast(),
            Some(Loaded::List(mut values)) if values.len() == 1 => values.remove(0).cast(),
            Some(Loaded::List(values)) => {
                tracing::debug!(
                    "{}: {} stored documents collapsed into one container",
                    self.name,
                    values.len()
                );
                let mut merged = LocalizedValue::<K>::new();
                for value in values {
                    for (language, v) in value.iter() {
                        if !is_blank(v) {
                            merged.set(language, v.clone());
                        }
                    }
                }
                merged.cast()
            }
            None => self.empty_value(),
        }
    }

    fn prepare(&self, value: &LocalizedValue<Raw>) -> Result<Option<Value>> {
        let typed: LocalizedValue<K> = value.cast();
        match self.clean(Some(typed))? {
            Some(cleaned) => self.get_prep_value(Some(&cleaned)),
            None => Ok(None),
        }
    }

    fn validate(&self, value: &LocalizedValue<Raw>) -> Result<()> {
        LocalizedField::validate(self, &value.cast())
    }

    fn decode_projection(&self, raw: Value) -> Value {
        self.from_projection(raw)
    }
}
