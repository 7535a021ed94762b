//! Retries for transient backend errors.
//!
//! [`RetryingBackend`] wraps any [`Backend`] and repeats failed requests with a capped
//! exponential backoff and full jitter. Only the request itself is retried: once
//! [`Backend::get_object`] has returned a body stream, errors while reading it are passed through
//! to the caller.

use std::future::Future;
use std::time::Duration;

use crate::PayloadStream;
use crate::backend::common::Backend;
use crate::error::BackendResult;

/// Parameters of the exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. `1` disables retries.
    pub max_attempts: u32,
    /// Upper bound of the delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound of any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Returns the upper bound of the delay after the given failed attempt (starting at 1).
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Picks a uniformly random delay below the ceiling for the given failed attempt.
    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_ceiling(attempt)
            .mul_f64(rand::random::<f64>())
    }

    async fn run<T, F, Fut>(&self, operation: &str, resource: &str, mut f: F) -> BackendResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        error = &err as &dyn std::error::Error,
                        operation,
                        resource,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// A [`Backend`] decorator retrying transient errors according to a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryingBackend<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: Backend> RetryingBackend<B> {
    /// Wraps `inner` with the given policy.
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait::async_trait]
impl<B: Backend> Backend for RetryingBackend<B> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>> {
        self.policy
            .run("list", prefix, || self.inner.list_keys(prefix))
            .await
    }

    async fn get_object(&self, key: &str) -> BackendResult<PayloadStream> {
        self.policy
            .run("get", key, || self.inner.get_object(key))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::BackendError;
    use crate::{BoxedBackend, InMemoryBackend};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ceiling(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_ceiling(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_ceiling(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_ceiling(9), Duration::from_secs(20));
        assert_eq!(policy.backoff_ceiling(64), Duration::from_secs(20));

        for attempt in 1..12 {
            assert!(policy.backoff(attempt) <= policy.backoff_ceiling(attempt));
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = &AtomicU32::new(0);
        let result = fast_policy(5)
            .run("get", "a", || async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call < 3 {
                    Err(BackendError::Status {
                        context: "get".into(),
                        status: 503,
                    })
                } else {
                    Ok(call)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let backend = InMemoryBackend::new();
        backend.insert("a", "a");
        backend.fail_key("a");

        let retrying = RetryingBackend::new(backend.clone(), fast_policy(4));
        let err = retrying.get_object("a").await.err().unwrap();

        assert!(matches!(err, BackendError::Status { status: 500, .. }));
        assert_eq!(backend.get_requests(), 4);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let backend = InMemoryBackend::new();
        let boxed: BoxedBackend = Box::new(backend.clone());

        let retrying = RetryingBackend::new(boxed, fast_policy(10));
        let err = retrying.get_object("missing").await.err().unwrap();

        assert!(matches!(err, BackendError::NotFound { .. }));
        assert_eq!(backend.get_requests(), 1);

        backend.fail_listing(403);
        assert!(retrying.list_keys("").await.is_err());
        assert_eq!(backend.list_requests(), 1);
    }
}
