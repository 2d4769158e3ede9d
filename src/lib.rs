//! Locale-aware model fields.
//!
//! A localized field stores one value per configured language in a single
//! JSON column. Reads resolve the active language through a fallback chain,
//! queries can filter and order on a single language, and slug fields stay
//! unique per language through an atomic retry on save.
//!
//! # Example
//!
//! ```rust,ignore
//! use localized_fields::field::{LocalizedCharField, UniqueSlugField};
//! use localized_fields::model::Model;
//! use localized_fields::repository::Repository;
//! use localized_fields::store::MemoryStore;
//!
//! let post = Model::builder("Post")
//!     .field(LocalizedCharField::new("title"))
//!     .field(UniqueSlugField::new("slug", "title"))
//!     .atomic_slug_retry()
//!     .build();
//! let repo = Repository::new(MemoryStore::new());
//! let saved = repo.create(&post, [("title", serde_json::json!({"en": "Hello"}))]).await?;
//! ```

pub mod admin;
pub mod config;
pub mod error;
pub mod field;
pub mod forms;
pub mod i18n;
pub mod model;
pub mod query;
pub mod repository;
pub mod resolver;
pub mod retry;
pub mod serializer;
pub mod store;
pub mod value;

pub use config::{settings, Settings};
pub use error::{IntegrityError, LocalizedError, Result};
pub use model::{Instance, Model};
pub use repository::Repository;
pub use value::{
    LocalizedBooleanValue, LocalizedFileValue, LocalizedFloatValue, LocalizedIntegerValue,
    LocalizedStringValue, LocalizedValue,
};
