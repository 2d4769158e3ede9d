//! File-kind localized field: one stored file per language.

use super::{LocalizedColumn, LocalizedField, Widget};
use crate::error::Result;
use crate::model::Instance;
use crate::value::{FieldFile, File, FileStorage, KindTag, LocalizedValue, Raw};
use chrono::format::{Item, StrftimeItems};
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type UploadFn = Arc<dyn Fn(&Instance, &str, &str) -> String + Send + Sync>;

/// Storage path for an uploaded file.
#[derive(Clone)]
pub enum UploadTo {
    /// Directory template; `{lang}` is replaced and strftime specifiers expanded
    Template(String),
    /// `(instance, filename, language) -> path`
    Func(UploadFn),
}

impl UploadTo {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Instance, &str, &str) -> String + Send + Sync + 'static,
    {
        UploadTo::Func(Arc::new(f))
    }
}

impl From<&str> for UploadTo {
    fn from(template: &str) -> Self {
        UploadTo::Template(template.to_string())
    }
}

impl fmt::Debug for UploadTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadTo::Template(t) => f.debug_tuple("Template").field(t).finish(),
            UploadTo::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Expand strftime specifiers when the template is a valid format string.
fn expand_date(template: &str) -> String {
    let items = StrftimeItems::new(template);
    if items.clone().any(|item| matches!(item, Item::Error)) {
        return template.to_string();
    }
    Utc::now().format_with_items(items).to_string()
}

#[derive(Debug, Clone)]
pub struct LocalizedFileField {
    field: LocalizedField<File>,
    upload_to: UploadTo,
    storage: Arc<dyn FileStorage>,
}

impl LocalizedFileField {
    pub fn new(
        name: impl Into<String>,
        upload_to: impl Into<UploadTo>,
        storage: Arc<dyn FileStorage>,
    ) -> Self {
        Self {
            field: LocalizedField::new(name),
            upload_to: upload_to.into(),
            storage,
        }
    }

    pub fn blank(mut self, blank: bool) -> Self {
        self.field = self.field.blank(blank);
        self
    }

    pub fn null(mut self, null: bool) -> Self {
        self.field = self.field.null(null);
        self
    }

    pub fn required(mut self, required: impl Into<super::Required>) -> Self {
        self.field = self.field.required(required);
        self
    }

    pub fn storage(&self) -> &Arc<dyn FileStorage> {
        &self.storage
    }

    pub fn inner(&self) -> &LocalizedField<File> {
        &self.field
    }

    /// Storage name for `filename` uploaded under `language`.
    pub fn generate_filename(&self, instance: &Instance, filename: &str, language: &str) -> String {
        match &self.upload_to {
            UploadTo::Func(f) => f(instance, filename, language),
            UploadTo::Template(template) => {
                let directory = expand_date(&template.replace("{lang}", language));
                let directory = directory.trim_end_matches('/');
                if directory.is_empty() {
                    filename.to_string()
                } else {
                    format!("{}/{}", directory, filename)
                }
            }
        }
    }

    /// Handle to the file stored for `language`.
    pub fn file(&self, instance: &Instance, language: &str) -> Result<FieldFile> {
        let name = instance
            .localized(self.name())?
            .get(language)
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(FieldFile::new(Arc::clone(&self.storage), name, language))
    }

    /// Store `content` for `language` and point the instance at it.
    ///
    /// The instance itself is not persisted; save it through the repository.
    pub fn save_file(
        &self,
        instance: &mut Instance,
        language: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<FieldFile> {
        let path = self.generate_filename(instance, filename, language);
        let mut file = FieldFile::new(Arc::clone(&self.storage), None, language);
        let stored = file.save(&path, content)?.to_string();
        instance.localized_mut(self.name())?.set(language, stored);
        Ok(file)
    }

    /// Delete the stored object for `language` and clear the reference.
    pub fn delete_file(&self, instance: &mut Instance, language: &str) -> Result<()> {
        let mut file = self.file(instance, language)?;
        file.delete()?;
        instance.localized_mut(self.name())?.set(language, Value::Null);
        Ok(())
    }
}

impl LocalizedColumn for LocalizedFileField {
    fn name(&self) -> &str {
        self.field.name()
    }

    fn kind(&self) -> KindTag {
        KindTag::File
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
        Widget::FileInput
    }

    fn empty_value(&self) -> LocalizedValue<Raw> {
        LocalizedColumn::empty_value(&self.field)
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

    fn as_file(&self) -> Option<&LocalizedFileField> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{override_settings, Settings, SettingsGuard};
    use crate::model::Model;
    use crate::value::FileSystemStorage;
    use serde_json::json;
    use tempfile::TempDir;

    fn settings() -> SettingsGuard {
        override_settings(Settings::new("en", [("en", "English"), ("nl", "Dutch")]))
    }

    fn storage() -> (TempDir, Arc<dyn FileStorage>) {
        let dir = TempDir::new().expect("Should create temp dir");
        let storage = FileSystemStorage::new(dir.path(), "/media");
        (dir, Arc::new(storage))
    }

    // ==================== generate_filename ====================

    #[test]
    fn test_template_with_language() {
        let _guard = settings();
        let (_dir, storage) = storage();
        let field = LocalizedFileField::new("document", "docs/{lang}/", storage);
        let model = Model::builder("Doc").field(field.clone()).build();
        let instance = model.instance();
        assert_eq!(field.generate_filename(&instance, "a.pdf", "nl"), "docs/nl/a.pdf");
    }

    #[test]
    fn test_template_expands_dates() {
        let _guard = settings();
        let (_dir, storage) = storage();
        let field = LocalizedFileField::new("document", "{lang}/%Y", storage);
        let model = Model::builder("Doc").field(field.clone()).build();
        let name = field.generate_filename(&model.instance(), "a.pdf", "en");
        let year = Utc::now().format("%Y").to_string();
        assert_eq!(name, format!("en/{}/a.pdf", year));
    }

    #[test]
    fn test_callable_upload_to() {
        let _guard = settings();
        let (_dir, storage) = storage();
        let field = LocalizedFileField::new(
            "document",
            UploadTo::func(|_instance, filename, lang| format!("custom/{}/{}", lang, filename)),
            storage,
        );
        let model = Model::builder("Doc").field(field.clone()).build();
        assert_eq!(
            field.generate_filename(&model.instance(), "x.txt", "en"),
            "custom/en/x.txt"
        );
    }

    // ==================== save / delete ====================

    #[test]
    fn test_save_file_sets_instance_value() {
        let _guard = settings();
        let (_dir, storage) = storage();
        let field = LocalizedFileField::new("document", "{lang}", Arc::clone(&storage)).blank(true);
        let model = Model::builder("Doc").field(field.clone()).build();
        let mut instance = model.instance();

        let file = field
            .save_file(&mut instance, "nl", "test.txt", b"inhoud")
            .expect("Should save");
        assert_eq!(file.name(), Some("nl/test.txt"));
        assert_eq!(file.language(), "nl");
        assert!(storage.exists("nl/test.txt"));
        assert_eq!(
            instance.localized("document").expect("Should exist").get("nl"),
            Some(&json!("nl/test.txt"))
        );

        let reopened = field.file(&instance, "nl").expect("Should open");
        assert_eq!(reopened.read().expect("Should read"), b"inhoud");
    }

    #[test]
    fn test_delete_file_clears_reference() {
        let _guard = settings();
        let (_dir, storage) = storage();
        let field = LocalizedFileField::new("document", "{lang}", Arc::clone(&storage)).blank(true);
        let model = Model::builder("Doc").field(field.clone()).build();
        let mut instance = model.instance();
        field
            .save_file(&mut instance, "en", "gone.txt", b"x")
            .expect("Should save");

        field.delete_file(&mut instance, "en").expect("Should delete");
        assert!(!storage.exists("en/gone.txt"));
        assert_eq!(instance.localized("document").expect("Should exist").get("en"), None);
        assert_eq!(field.file(&instance, "en").expect("Should open").name(), None);
    }

    #[test]
    fn test_file_value_must_be_a_name() {
        let _guard = settings();
        let (_dir, storage) = storage();
        let field = LocalizedFileField::new("document", "{lang}", storage).blank(true);
        let value = LocalizedValue::<Raw>::from_map([("en", json!(12))]);
        let err = LocalizedColumn::prepare(&field, &value).unwrap_err();
        assert!(err.to_string().contains("file name"));
    }
}
