//! Language handling: configured languages and the active language.
//!
//! # Architecture
//!
//! - `registry`: view over the configured languages and the primary language
//! - `language`: validated `Language` type used for explicit per-language access
//! - `activation`: the active language of the current thread, with scoped overrides
//!
//! # Example
//!
//! ```rust,ignore
//! use localized_fields::i18n::{self, Language, LanguageRegistry};
//!
//! let dutch = Language::from_code("nl")?;
//! let _guard = i18n::override_language("nl");
//! let languages = LanguageRegistry::get().codes();
//! ```

mod activation;
mod language;
mod registry;

pub use activation::{activate, deactivate, get_language, override_language, LanguageGuard};
pub use language::Language;
pub use registry::LanguageRegistry;
