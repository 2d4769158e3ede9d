//! File references held by file-kind localized values.

use crate::error::{LocalizedError, Result};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Backend that stores the bytes behind a file reference.
pub trait FileStorage: Send + Sync + fmt::Debug {
    /// Store `content` under `name` (or a free variant of it) and return the name used.
    fn save(&self, name: &str, content: &[u8]) -> Result<String>;

    fn open(&self, name: &str) -> Result<Vec<u8>>;

    fn delete(&self, name: &str) -> Result<()>;

    fn exists(&self, name: &str) -> bool;

    fn size(&self, name: &str) -> Result<u64>;

    fn url(&self, name: &str) -> String;

    /// Local filesystem path, for backends that have one.
    fn path(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}

/// Storage rooted at a directory, served under `base_url`.
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    root: PathBuf,
    base_url: String,
}

impl FileSystemStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    fn full_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// `name`, or `stem_N.ext` for the first N that is not taken.
    fn available_name(&self, name: &str) -> String {
        if !self.exists(name) {
            return name.to_string();
        }
        let path = Path::new(name);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());

        let mut counter = 1u32;
        loop {
            let file_name = format!("{}_{}{}", stem, counter, extension);
            let candidate = match parent {
                Some(parent) => parent.join(&file_name).to_string_lossy().into_owned(),
                None => file_name,
            };
            if !self.exists(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }
}

impl FileStorage for FileSystemStorage {
    fn save(&self, name: &str, content: &[u8]) -> Result<String> {
        let name = self.available_name(name);
        let path = self.full_path(&name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        debug!("Stored file {} ({} bytes)", name, content.len());
        Ok(name)
    }

    fn open(&self, name: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.full_path(name))?)
    }

    fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.full_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.full_path(name).exists()
    }

    fn size(&self, name: &str) -> Result<u64> {
        Ok(fs::metadata(self.full_path(name))?.len())
    }

    fn url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }

    fn path(&self, name: &str) -> Option<PathBuf> {
        Some(self.full_path(name))
    }
}

/// Handle to the stored file for one language of a file-kind value.
#[derive(Debug, Clone)]
pub struct FieldFile {
    storage: Arc<dyn FileStorage>,
    name: Option<String>,
    language: String,
    committed: bool,
}

impl FieldFile {
    pub fn new(storage: Arc<dyn FileStorage>, name: Option<String>, language: &str) -> Self {
        let name = name.filter(|n| !n.is_empty());
        Self {
            committed: name.is_some(),
            storage,
            name,
            language: language.to_string(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn storage(&self) -> &Arc<dyn FileStorage> {
        &self.storage
    }

    fn require_name(&self) -> Result<&str> {
        self.name.as_deref().ok_or_else(|| {
            LocalizedError::File(io::Error::new(
                ErrorKind::NotFound,
                format!(
                    "The '{}' file reference has no file associated with it",
                    self.language
                ),
            ))
        })
    }

    pub fn url(&self) -> Result<String> {
        Ok(self.storage.url(self.require_name()?))
    }

    pub fn size(&self) -> Result<u64> {
        self.storage.size(self.require_name()?)
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        self.storage.open(self.require_name()?)
    }

    pub fn exists(&self) -> bool {
        self.name
            .as_deref()
            .map(|name| self.storage.exists(name))
            .unwrap_or(false)
    }

    /// Write `content` to storage under `name` and point this handle at it.
    pub fn save(&mut self, name: &str, content: &[u8]) -> Result<&str> {
        let stored = self.storage.save(name, content)?;
        self.committed = true;
        Ok(self.name.insert(stored).as_str())
    }

    /// Remove the stored object and clear the reference.
    pub fn delete(&mut self) -> Result<()> {
        if let Some(name) = self.name.take() {
            self.storage.delete(&name)?;
        }
        self.committed = false;
        Ok(())
    }

    /// Attribute access forwarded to the underlying stored file.
    pub fn attribute(&self, key: &str) -> Result<Value> {
        match key {
            "name" => Ok(self.name.clone().map(Value::String).unwrap_or(Value::Null)),
            "language" | "lang" => Ok(Value::String(self.language.clone())),
            "url" => self.url().map(Value::String),
            "size" => self.size().map(Value::from),
            "path" => {
                let name = self.require_name()?;
                self.storage
                    .path(name)
                    .map(|p| Value::String(p.to_string_lossy().into_owned()))
                    .ok_or_else(|| LocalizedError::MissingAttribute {
                        kind: "FieldFile",
                        attribute: key.to_string(),
                    })
            }
            "exists" => Ok(Value::Bool(self.exists())),
            "committed" => Ok(Value::Bool(self.committed)),
            _ => Err(LocalizedError::MissingAttribute {
                kind: "FieldFile",
                attribute: key.to_string(),
            }),
        }
    }
}

impl PartialEq for FieldFile {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.language == other.language
    }
}

impl fmt::Display for FieldFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_deref().unwrap_or(""))
    }
}
