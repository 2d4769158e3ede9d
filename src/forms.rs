//! Multi-part form fields: one sub-input per configured language.

use crate::config::{self, DisplayMode, Settings};
use crate::field::{LocalizedColumn, Required, Widget};
use crate::value::{is_blank, KindTag, LocalizedValue, Raw};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("This field is required.")]
    Required { language: Option<String> },

    #[error("Enter {expected} for '{language}'.")]
    Invalid {
        language: String,
        expected: &'static str,
    },

    #[error("Enter a list of values.")]
    NotAList,

    #[error("Please either submit a file or check the clear checkbox for '{language}', not both.")]
    Contradiction { language: String },
}

impl FormError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            FormError::Required { .. } => "required",
            FormError::Invalid { .. } | FormError::NotAList => "invalid",
            FormError::Contradiction { .. } => "contradiction",
        }
    }
}

/// Input control rendered for one language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubInput {
    Char,
    Integer,
    Float,
    NullBoolean,
    File,
    Hidden,
}

/// Sub-input per kind.
const SUB_INPUTS: &[(KindTag, SubInput)] = &[
    (KindTag::Raw, SubInput::Char),
    (KindTag::Text, SubInput::Char),
    (KindTag::Integer, SubInput::Integer),
    (KindTag::Float, SubInput::Float),
    (KindTag::Boolean, SubInput::NullBoolean),
    (KindTag::File, SubInput::File),
];

pub fn sub_input_for(kind: KindTag) -> SubInput {
    SUB_INPUTS
        .iter()
        .find(|(tag, _)| *tag == kind)
        .map(|(_, input)| *input)
        .unwrap_or(SubInput::Char)
}

/// The input for one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubField {
    pub language: String,
    /// The language code
    pub label: String,
    pub required: bool,
    pub input: SubInput,
}

/// Submitted state of one per-language file input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileInput {
    /// Nothing submitted
    Empty,
    /// The clear checkbox was ticked
    Clear,
    /// A file was uploaded and the clear checkbox ticked
    Contradiction,
    Upload { name: String, content: Vec<u8> },
}

/// A file uploaded through the form, to be stored by the file field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub language: String,
    pub name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalizedFormField {
    kind: KindTag,
    widget: Widget,
    required: bool,
    fields: Vec<SubField>,
    display: DisplayMode,
}

impl LocalizedFormField {
    /// Form field for `kind` under the current settings.
    ///
    /// `Required::Nothing` makes every sub-input optional. `Required::All`
    /// and a language list make the field required and mark the listed
    /// sub-inputs required.
    pub fn new(kind: KindTag, required: impl Into<Required>) -> Self {
        Self::with_settings(&config::settings(), kind, required.into())
    }

    pub fn with_settings(settings: &Settings, kind: KindTag, required: Required) -> Self {
        let (field_required, languages) = match required {
            Required::Nothing => (false, Vec::new()),
            Required::All => (true, settings.language_codes()),
            Required::Languages(languages) => (true, languages),
        };
        let input = sub_input_for(kind);
        let fields = settings
            .language_codes()
            .into_iter()
            .map(|code| SubField {
                required: languages.contains(&code),
                label: code.clone(),
                language: code,
                input,
            })
            .collect();
        Self {
            kind,
            widget: default_widget(kind),
            required: field_required,
            fields,
            display: settings.display,
        }
    }

    /// Form field for a declared localized field.
    ///
    /// Slug fields are generated on save and map to an optional hidden input.
    pub fn for_column(column: &dyn LocalizedColumn) -> Self {
        let settings = config::settings();
        if column.as_slug().is_some() {
            let mut field = Self::with_settings(&settings, column.kind(), Required::Nothing);
            field.widget = Widget::HiddenInput;
            for sub in &mut field.fields {
                sub.input = SubInput::Hidden;
            }
            return field;
        }
        let required = if column.is_blank() && column.required_languages().is_empty() {
            Required::Nothing
        } else {
            Required::Languages(column.required_languages())
        };
        let mut field = Self::with_settings(&settings, column.kind(), required);
        field.widget = column.widget();
        field
    }

    pub fn with_display(mut self, display: DisplayMode) -> Self {
        self.display = display;
        self
    }

    pub fn kind(&self) -> KindTag {
        self.kind
    }

    pub fn widget(&self) -> Widget {
        self.widget
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn fields(&self) -> &[SubField] {
        &self.fields
    }

    pub fn display(&self) -> DisplayMode {
        self.display
    }

    /// Split a value into one entry per sub-input.
    ///
    /// Accepts a stored document, JSON text of one, or a bare scalar (which
    /// fills the primary language).
    pub fn decompress(&self, value: Option<&Value>) -> Vec<Value> {
        match value {
            None | Some(Value::Null) => vec![Value::Null; self.fields.len()],
            Some(Value::Object(map)) => self
                .fields
                .iter()
                .map(|sub| map.get(&sub.language).cloned().unwrap_or(Value::Null))
                .collect(),
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(parsed @ Value::Object(_)) => self.decompress(Some(&parsed)),
                _ => self.primary_only(Value::String(text.clone())),
            },
            Some(other) => self.primary_only(other.clone()),
        }
    }

    pub fn decompress_value(&self, value: &LocalizedValue<Raw>) -> Vec<Value> {
        self.fields
            .iter()
            .map(|sub| value.get(&sub.language).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn primary_only(&self, value: Value) -> Vec<Value> {
        let primary = config::settings().language_code.clone();
        self.fields
            .iter()
            .map(|sub| {
                if sub.language == primary {
                    value.clone()
                } else {
                    Value::Null
                }
            })
            .collect()
    }

    /// Join per-language entries back into a container.
    pub fn compress(&self, values: Vec<Value>) -> LocalizedValue<Raw> {
        let mut container = LocalizedValue::<Raw>::new();
        for (sub, value) in self.fields.iter().zip(values) {
            container.set(&sub.language, value);
        }
        container
    }

    /// Validate submitted entries (a JSON list, one per sub-input).
    pub fn clean(&self, data: &Value) -> Result<LocalizedValue<Raw>, FormError> {
        let Value::Array(items) = data else {
            return Err(FormError::NotAList);
        };

        if self.required && items.iter().all(is_blank) {
            return Err(FormError::Required { language: None });
        }

        let mut cleaned = Vec::with_capacity(self.fields.len());
        for (index, sub) in self.fields.iter().enumerate() {
            let raw = items.get(index).cloned().unwrap_or(Value::Null);
            if is_blank(&raw) {
                if sub.required {
                    return Err(FormError::Required {
                        language: Some(sub.language.clone()),
                    });
                }
                cleaned.push(self.kind.empty());
                continue;
            }
            let value = self.kind.prepare(&raw).ok_or_else(|| FormError::Invalid {
                language: sub.language.clone(),
                expected: self.kind.expected(),
            })?;
            cleaned.push(value);
        }
        Ok(self.compress(cleaned))
    }

    /// Values the file sub-inputs display after a submission: the initial
    /// file is kept when nothing or a contradiction was submitted.
    pub fn bound_data(&self, inputs: &[FileInput], initial: &LocalizedValue<Raw>) -> Vec<Value> {
        self.fields
            .iter()
            .enumerate()
            .map(|(index, sub)| {
                let initial = initial.get(&sub.language).cloned().unwrap_or(Value::Null);
                match inputs.get(index) {
                    None | Some(FileInput::Empty) | Some(FileInput::Contradiction) => initial,
                    Some(FileInput::Clear) => Value::Null,
                    Some(FileInput::Upload { name, .. }) => Value::String(name.clone()),
                }
            })
            .collect()
    }

    /// Validate file sub-inputs against the currently stored files.
    ///
    /// Returns the resulting container (uploads under their submitted name)
    /// and the uploads to store.
    pub fn clean_files(
        &self,
        inputs: Vec<FileInput>,
        initial: &LocalizedValue<Raw>,
    ) -> Result<(LocalizedValue<Raw>, Vec<Upload>), FormError> {
        let mut container = LocalizedValue::<Raw>::new();
        let mut uploads = Vec::new();
        let mut inputs = inputs.into_iter();

        for sub in &self.fields {
            let current = initial.get(&sub.language).cloned().unwrap_or(Value::Null);
            let value = match inputs.next().unwrap_or(FileInput::Empty) {
                FileInput::Contradiction => {
                    return Err(FormError::Contradiction {
                        language: sub.language.clone(),
                    })
                }
                FileInput::Empty => current,
                FileInput::Clear => Value::Null,
                FileInput::Upload { name, content } => {
                    uploads.push(Upload {
                        language: sub.language.clone(),
                        name: name.clone(),
                        content,
                    });
                    Value::String(name)
                }
            };
            if is_blank(&value) && sub.required {
                return Err(FormError::Required {
                    language: Some(sub.language.clone()),
                });
            }
            container.set(&sub.language, value);
        }

        if self.required && container.is_empty() {
            return Err(FormError::Required { language: None });
        }
        Ok((container, uploads))
    }
}

fn default_widget(kind: KindTag) -> Widget {
    match kind {
        KindTag::Raw | KindTag::Text => Widget::TextInput,
        KindTag::Integer | KindTag::Float => Widget::NumberInput,
        KindTag::Boolean => Widget::CheckboxInput,
        KindTag::File => Widget::FileInput,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{override_settings, SettingsGuard};
    use crate::field::{LocalizedCharField, LocalizedTextField, UniqueSlugField};
    use serde_json::json;

    fn settings() -> SettingsGuard {
        override_settings(Settings::new(
            "en",
            [("en", "English"), ("nl", "Dutch"), ("ro", "Romanian"), ("de", "German")],
        ))
    }

    // ==================== Construction ====================

    #[test]
    fn test_one_sub_field_per_language_labelled_with_code() {
        let _guard = settings();
        let field = LocalizedFormField::new(KindTag::Text, Required::Nothing);
        let labels: Vec<&str> = field.fields().iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["en", "nl", "ro", "de"]);
    }

    #[test]
    fn test_not_required_means_no_sub_field_required() {
        let _guard = settings();
        let field = LocalizedFormField::new(KindTag::Text, false);
        assert!(!field.is_required());
        assert!(field.fields().iter().all(|f| !f.required));
    }

    #[test]
    fn test_required_list_marks_listed_languages() {
        let _guard = settings();
        let field = LocalizedFormField::new(KindTag::Text, ["en", "nl"]);
        assert!(field.is_required());
        for sub in field.fields() {
            assert_eq!(sub.required, sub.label == "en" || sub.label == "nl");
        }
    }

    #[test]
    fn test_sub_inputs_follow_kind() {
        assert_eq!(sub_input_for(KindTag::Integer), SubInput::Integer);
        assert_eq!(sub_input_for(KindTag::Boolean), SubInput::NullBoolean);
        assert_eq!(sub_input_for(KindTag::File), SubInput::File);
    }

    #[test]
    fn test_for_column_uses_field_rules() {
        let _guard = settings();
        let title = LocalizedCharField::new("title");
        let form = LocalizedFormField::for_column(&title);
        assert!(form.is_required());
        let required: Vec<&str> = form
            .fields()
            .iter()
            .filter(|f| f.required)
            .map(|f| f.language.as_str())
            .collect();
        assert_eq!(required, vec!["en"]);

        let body = LocalizedTextField::new("body").blank(true);
        let form = LocalizedFormField::for_column(&body);
        assert!(!form.is_required());
        assert_eq!(form.widget(), Widget::Textarea);
    }

    #[test]
    fn test_slug_column_is_hidden_and_optional() {
        let _guard = settings();
        let slug = UniqueSlugField::new("slug", "title");
        let form = LocalizedFormField::for_column(&slug);
        assert!(!form.is_required());
        assert_eq!(form.widget(), Widget::HiddenInput);
        assert!(form.fields().iter().all(|f| f.input == SubInput::Hidden));
    }

    // ==================== Compress / Decompress ====================

    #[test]
    fn test_compress() {
        let _guard = settings();
        let field = LocalizedFormField::new(KindTag::Text, false);
        let value = field.compress(vec![
            json!("English"),
            json!("Dutch"),
            json!("Romanian"),
            json!("German"),
        ]);
        assert_eq!(value.get("en"), Some(&json!("English")));
        assert_eq!(value.get("de"), Some(&json!("German")));
    }

    #[test]
    fn test_decompress_shapes() {
        let _guard = settings();
        let field = LocalizedFormField::new(KindTag::Text, false);
        assert_eq!(
            field.decompress(Some(&json!({"en": "a", "ro": "c"}))),
            vec![json!("a"), Value::Null, json!("c"), Value::Null]
        );
        assert_eq!(
            field.decompress(Some(&json!(r#"{"nl": "b"}"#))),
            vec![Value::Null, json!("b"), Value::Null, Value::Null]
        );
        assert_eq!(
            field.decompress(Some(&json!("plain"))),
            vec![json!("plain"), Value::Null, Value::Null, Value::Null]
        );
        assert_eq!(field.decompress(None), vec![Value::Null; 4]);
    }

    // ==================== Clean ====================

    #[test]
    fn test_clean_requires_a_list() {
        let _guard = settings();
        let field = LocalizedFormField::new(KindTag::File, Required::All);
        let err = field.clean(&json!("not a list")).unwrap_err();
        assert_eq!(err.code(), "invalid");
    }

    #[test]
    fn test_clean_empty_required() {
        let _guard = settings();
        let field = LocalizedFormField::new(KindTag::File, Required::All);
        let err = field.clean(&json!([null, null, null, null])).unwrap_err();
        assert_eq!(err.code(), "required");
    }

    #[test]
    fn test_clean_empty_optional() {
        let _guard = settings();
        let field = LocalizedFormField::new(KindTag::File, false);
        let value = field.clean(&json!([null, null, null, null])).expect("Should clean");
        assert!(value.is_empty());
    }

    #[test]
    fn test_clean_names_missing_language() {
        let _guard = settings();
        let field = LocalizedFormField::new(KindTag::Text, ["en", "nl"]);
        let err = field.clean(&json!(["Hello", "", "", ""])).unwrap_err();
        assert_eq!(
            err,
            FormError::Required {
                language: Some("nl".to_string())
            }
        );
    }

    #[test]
    fn test_clean_checks_kind() {
        let _guard = settings();
        let field = LocalizedFormField::new(KindTag::Integer, false);
        let value = field.clean(&json!(["12", 3, null, ""])).expect("Should clean");
        assert_eq!(value.get("en"), Some(&json!(12)));
        assert_eq!(value.get("nl"), Some(&json!(3)));

        let err = field.clean(&json!(["twelve", null, null, null])).unwrap_err();
        assert_eq!(err.code(), "invalid");
        assert!(err.to_string().contains("an integer"));
    }

    // ==================== Files ====================

    #[test]
    fn test_bound_data_keeps_initial_files() {
        let _guard = settings();
        let field = LocalizedFormField::new(KindTag::File, false);
        let initial = LocalizedValue::<Raw>::from_map([("en", "en.pdf"), ("nl", "nl.pdf")]);
        let bound = field.bound_data(
            &[
                FileInput::Empty,
                FileInput::Contradiction,
                FileInput::Upload {
                    name: "ro.pdf".to_string(),
                    content: b"x".to_vec(),
                },
                FileInput::Clear,
            ],
            &initial,
        );
        assert_eq!(
            bound,
            vec![json!("en.pdf"), json!("nl.pdf"), json!("ro.pdf"), Value::Null]
        );
    }

    #[test]
    fn test_clean_files() {
        let _guard = settings();
        let field = LocalizedFormField::new(KindTag::File, false);
        let initial = LocalizedValue::<Raw>::from_map([("en", "en.pdf"), ("nl", "nl.pdf")]);
        let (value, uploads) = field
            .clean_files(
                vec![
                    FileInput::Empty,
                    FileInput::Clear,
                    FileInput::Upload {
                        name: "ro.pdf".to_string(),
                        content: b"data".to_vec(),
                    },
                ],
                &initial,
            )
            .expect("Should clean");
        assert_eq!(value.get("en"), Some(&json!("en.pdf")));
        assert_eq!(value.get("nl"), None);
        assert_eq!(value.get("ro"), Some(&json!("ro.pdf")));
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].language, "ro");

        let err = field
            .clean_files(vec![FileInput::Contradiction], &initial)
            .unwrap_err();
        assert_eq!(err.code(), "contradiction");
    }
}
