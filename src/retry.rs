//! Atomic slug retry protocol.
//!
//! A save runs as a sequence of attempts. Each attempt regenerates the slugs
//! for the current retry count and writes the row atomically. A uniqueness
//! violation on a slug key is a conflict and triggers another attempt; any
//! other error ends the loop immediately.

use crate::config::{self, Settings};
use crate::error::{IntegrityError, LocalizedError};
use crate::field::LocalizedColumn;
use crate::model::Model;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// States of the retry loop around a single save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Attempt,
    Success,
    Conflict,
    Exhausted,
    Failed,
}

/// Configuration for the slug retry loop
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Conflicts tolerated before the violation is surfaced
    pub max_retries: u32,
    /// Pause before each retry (none by default)
    pub delay: Duration,
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            delay: Duration::ZERO,
        }
    }

    /// Set the pause before each retry
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.max_retries)
    }

    /// Retry budget from the settings in effect right now.
    pub fn current() -> Self {
        Self::from_settings(&config::settings())
    }

    /// State after a failed attempt.
    ///
    /// `retries` counts conflicts seen so far, including this one.
    pub fn after_failure(&self, retries: u32, retryable: bool) -> AttemptState {
        if !retryable {
            AttemptState::Failed
        } else if retries >= self.max_retries {
            AttemptState::Exhausted
        } else {
            AttemptState::Conflict
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(Settings::default().max_retries)
    }
}

/// Whether `err` is a violation of one of the model's slug uniqueness keys.
pub fn is_slug_conflict(model: &Model, err: &IntegrityError) -> bool {
    let Some(field) = err.field.as_deref() else {
        return false;
    };
    model
        .slug_fields()
        .any(|slug| slug.name() == field && slug.covers(err.language.as_deref()))
}

/// Whether a failed save of `model` should be retried with fresh slugs.
pub fn is_retryable(model: &Model, err: &LocalizedError) -> bool {
    err.as_integrity()
        .map(|integrity| is_slug_conflict(model, integrity))
        .unwrap_or(false)
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent.
///
/// # Arguments
/// * `config` - Retry budget
/// * `operation_name` - Name of the operation for logging
/// * `operation` - Async closure receiving the number of conflicts seen so far
///   and the error of the previous attempt, if any
/// * `should_retry` - Classifier for errors worth another attempt
///
/// # Returns
/// The result of the first successful attempt, or the error of the last one
/// exactly as the operation returned it
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut(u32, Option<&E>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut retries = 0;
    let mut last_error: Option<E> = None;

    loop {
        if retries > 0 && !config.delay.is_zero() {
            sleep(config.delay).await;
        }

        match operation(retries, last_error.as_ref()).await {
            Ok(result) => {
                if retries > 0 {
                    debug!(
                        "{}: Succeeded after {} conflict(s)",
                        operation_name, retries
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                let retryable = should_retry(&e);
                let seen = if retryable { retries + 1 } else { retries };
                match config.after_failure(seen, retryable) {
                    AttemptState::Failed => {
                        debug!(
                            "{}: Error is not retryable, failing immediately: {}",
                            operation_name, e
                        );
                        return Err(e);
                    }
                    AttemptState::Exhausted => {
                        warn!(
                            "{}: All {} attempts failed. Last error: {}",
                            operation_name, seen, e
                        );
                        return Err(e);
                    }
                    _ => {
                        warn!(
                            "{}: Attempt {}/{} failed ({}), {} retries remaining",
                            operation_name,
                            seen,
                            config.max_retries,
                            e,
                            config.max_retries - seen
                        );
                        retries = seen;
                        last_error = Some(e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{override_settings, Settings};
    use crate::field::{LocalizedCharField, UniqueSlugField};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn model() -> Arc<Model> {
        Model::builder("Post")
            .field(LocalizedCharField::new("title"))
            .field(UniqueSlugField::new("slug", "title").uniqueness(["en"]))
            .unique_column("code")
            .atomic_slug_retry()
            .build()
    }

    // ==================== Configuration ====================

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 100);
        assert_eq!(config.delay, Duration::ZERO);
    }

    #[test]
    fn test_retry_config_from_settings() {
        let _guard = override_settings(Settings::default().with_max_retries(7));
        assert_eq!(RetryConfig::current().max_retries, 7);
    }

    #[test]
    fn test_after_failure_transitions() {
        let config = RetryConfig::new(3);
        assert_eq!(config.after_failure(1, true), AttemptState::Conflict);
        assert_eq!(config.after_failure(3, true), AttemptState::Exhausted);
        assert_eq!(config.after_failure(0, false), AttemptState::Failed);
    }

    // ==================== Conflict Classification ====================

    #[test]
    fn test_slug_key_violation_is_conflict() {
        let _guard = override_settings(Settings::new("en", [("en", "English"), ("nl", "Dutch")]));
        let model = model();
        assert!(is_slug_conflict(&model, &IntegrityError::unique_language("slug", "en")));
    }

    #[test]
    fn test_language_outside_uniqueness_is_not_conflict() {
        let _guard = override_settings(Settings::new("en", [("en", "English"), ("nl", "Dutch")]));
        let model = model();
        assert!(!is_slug_conflict(&model, &IntegrityError::unique_language("slug", "nl")));
    }

    #[test]
    fn test_unrelated_violation_is_not_conflict() {
        let model = model();
        assert!(!is_slug_conflict(&model, &IntegrityError::unique_column("code")));
        assert!(!is_slug_conflict(&model, &IntegrityError::new("something broke")));
        assert!(!is_retryable(&model, &LocalizedError::Storage("down".to_string())));
    }

    // ==================== Retry Loop ====================

    #[tokio::test]
    async fn test_with_retry_if_succeeds_first_attempt() {
        let config = RetryConfig::new(3);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<u32, &str> = with_retry_if(
            &config,
            "test",
            |_, _| {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_if_passes_conflict_count() {
        let config = RetryConfig::new(5);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let result: Result<u32, &str> = with_retry_if(
            &config,
            "test",
            |retries, _| {
                seen_clone.lock().unwrap().push(retries);
                async move {
                    if retries < 2 {
                        Err("conflict")
                    } else {
                        Ok(retries)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_with_retry_if_passes_previous_error() {
        let config = RetryConfig::new(5);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let result: Result<u32, String> = with_retry_if(
            &config,
            "test",
            |retries, last: Option<&String>| {
                seen_clone.lock().unwrap().push(last.cloned());
                async move {
                    if retries < 2 {
                        Err(format!("conflict on attempt {}", retries))
                    } else {
                        Ok(retries)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                None,
                Some("conflict on attempt 0".to_string()),
                Some("conflict on attempt 1".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_with_retry_if_exhausts_budget() {
        let config = RetryConfig::new(3);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<u32, &str> = with_retry_if(
            &config,
            "test",
            |_, _| {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("duplicate key")
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap_err(), "duplicate key");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_if_non_retryable_error() {
        let config = RetryConfig::new(3);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<u32, &str> = with_retry_if(
            &config,
            "test",
            |_, _| {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("value too long")
                }
            },
            |e: &&str| e.contains("duplicate"),
        )
        .await;

        assert_eq!(result.unwrap_err(), "value too long");
        // Should only have tried once since the error is not a conflict
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_if_zero_budget_surfaces_first_conflict() {
        let config = RetryConfig::new(0);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<u32, &str> = with_retry_if(
            &config,
            "test",
            |_, _| {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("duplicate key")
                }
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_if_waits_between_attempts() {
        let config = RetryConfig::new(2).with_delay(Duration::from_millis(5));
        let start = std::time::Instant::now();

        let result: Result<u32, &str> =
            with_retry_if(&config, "test", |_, _| async { Err("duplicate key") }, |_| true).await;

        assert!(result.is_err());
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
