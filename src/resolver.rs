//! Translation resolution: target language, fallback chain, primary language.
//!
//! [`language_chain`] is the single definition of the lookup order. The
//! in-memory resolver below and the query layer (both the evaluator and the
//! SQL compiler) consume it, so query-time and in-memory fallback agree.

use crate::config::{self, Settings};
use crate::i18n;
use crate::value::{is_blank, LocalizedValue, ValueKind};
use serde_json::Value;

/// Languages consulted for `target`, in order: the target itself, its
/// configured fallbacks, then the primary language. Duplicates are dropped.
pub fn language_chain(settings: &Settings, target: &str) -> Vec<String> {
    let mut chain: Vec<String> = Vec::with_capacity(2 + settings.fallbacks_for(target).len());
    let candidates = std::iter::once(target)
        .chain(settings.fallbacks_for(target).iter().map(String::as_str))
        .chain(std::iter::once(settings.language_code.as_str()));
    for code in candidates {
        if !chain.iter().any(|c| c == code) {
            chain.push(code.to_string());
        }
    }
    chain
}

/// Explicit language if given, else the active language, else the primary language.
pub fn target_language(settings: &Settings, explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(i18n::get_language)
        .unwrap_or_else(|| settings.language_code.clone())
}

/// First non-blank stored value along the chain, with the language it came from.
pub fn resolve_in<'a, K: ValueKind>(
    value: &'a LocalizedValue<K>,
    settings: &Settings,
    target: &str,
) -> Option<(String, &'a Value)> {
    language_chain(settings, target)
        .into_iter()
        .find_map(|code| match value.get(&code) {
            Some(v) if !is_blank(v) => Some((code, v)),
            _ => None,
        })
}

/// Raw resolved value using the current settings.
pub fn resolve<'a, K: ValueKind>(
    value: &'a LocalizedValue<K>,
    language: Option<&str>,
) -> Option<&'a Value> {
    let settings = config::settings();
    let target = target_language(&settings, language);
    resolve_in(value, &settings, &target).map(|(_, v)| v)
}

/// Resolve and coerce to the kind's scalar.
///
/// The first non-blank raw value wins; when it cannot be coerced the result
/// is `None` (later languages are not consulted).
pub fn translate<K: ValueKind>(value: &LocalizedValue<K>, language: Option<&str>) -> Option<K::Scalar> {
    resolve(value, language).and_then(K::coerce)
}
