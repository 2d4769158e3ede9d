//! Active language for the current thread of execution.
//!
//! The active language is ambient per-call state. It never leaks across
//! threads and scoped overrides restore the previous value when dropped.

use std::cell::RefCell;

thread_local! {
    static ACTIVE_LANGUAGE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Activate `code` for the current thread.
pub fn activate(code: &str) {
    ACTIVE_LANGUAGE.with(|cell| {
        *cell.borrow_mut() = Some(code.to_string());
    });
}

/// Clear the active language; resolution falls back to the primary language.
pub fn deactivate() {
    ACTIVE_LANGUAGE.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

/// The active language for the current thread, if one is set.
pub fn get_language() -> Option<String> {
    ACTIVE_LANGUAGE.with(|cell| cell.borrow().clone())
}

/// Restores the previously active language on drop.
#[must_use = "the language is restored as soon as the guard is dropped"]
pub struct LanguageGuard {
    previous: Option<String>,
}

impl Drop for LanguageGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE_LANGUAGE.with(|cell| {
            *cell.borrow_mut() = previous;
        });
    }
}

/// Force `code` as the active language until the returned guard drops.
///
/// # Example
/// ```ignore
/// let _guard = override_language("nl");
/// assert_eq!(get_language().as_deref(), Some("nl"));
/// ```
pub fn override_language(code: &str) -> LanguageGuard {
    let previous = ACTIVE_LANGUAGE.with(|cell| cell.replace(Some(code.to_string())));
    LanguageGuard { previous }
}
