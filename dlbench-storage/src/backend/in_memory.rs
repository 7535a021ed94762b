//! In-memory backend for tests.
//!
//! This provides a [`Backend`] backed by a sorted map, removing the need for a real storage
//! service in unit and integration tests. The backend is [`Clone`] so tests can hold a handle for
//! inspection and failure injection while the benchmark owns a shared copy.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::StreamExt;

use crate::PayloadStream;
use crate::backend::common::Backend;
use crate::error::{BackendError, BackendResult};

#[derive(Debug, Default)]
struct Inner {
    store: Mutex<BTreeMap<String, Bytes>>,
    failing_keys: Mutex<HashSet<String>>,
    fail_listing: Mutex<Option<u16>>,
    list_requests: AtomicUsize,
    get_requests: AtomicUsize,
}

/// A [`Backend`] holding all objects in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object under the given key, replacing any previous contents.
    pub fn insert(&self, key: impl Into<String>, contents: impl Into<Bytes>) {
        self.inner
            .store
            .lock()
            .unwrap()
            .insert(key.into(), contents.into());
    }

    /// Makes every subsequent request for `key` fail with a server error.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.inner.failing_keys.lock().unwrap().insert(key.into());
    }

    /// Makes every subsequent listing fail with the given HTTP status.
    pub fn fail_listing(&self, status: u16) {
        *self.inner.fail_listing.lock().unwrap() = Some(status);
    }

    /// Returns the number of listing requests received so far.
    pub fn list_requests(&self) -> usize {
        self.inner.list_requests.load(Ordering::Relaxed)
    }

    /// Returns the number of get requests received so far, including failed ones.
    pub fn get_requests(&self) -> usize {
        self.inner.get_requests.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>> {
        self.inner.list_requests.fetch_add(1, Ordering::Relaxed);

        if let Some(status) = *self.inner.fail_listing.lock().unwrap() {
            return Err(BackendError::Status {
                context: format!("failed to list objects under `{prefix}`"),
                status,
            });
        }

        let store = self.inner.store.lock().unwrap();
        let keys = store
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        Ok(keys)
    }

    async fn get_object(&self, key: &str) -> BackendResult<PayloadStream> {
        self.inner.get_requests.fetch_add(1, Ordering::Relaxed);

        if self.inner.failing_keys.lock().unwrap().contains(key) {
            return Err(BackendError::Status {
                context: format!("failed to get `{key}`"),
                status: 500,
            });
        }

        let entry = self.inner.store.lock().unwrap().get(key).cloned();
        match entry {
            Some(bytes) => Ok(futures_util::stream::once(async move { Ok(bytes) }).boxed()),
            None => Err(BackendError::NotFound { key: key.into() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use super::*;

    #[tokio::test]
    async fn lists_by_string_prefix() {
        let backend = InMemoryBackend::new();
        backend.insert("randomdata/K001/a", "a");
        backend.insert("randomdata/K001/b", "b");
        backend.insert("randomdata/K004/c", "c");
        backend.insert("randomdatax", "x");

        let keys = backend.list_keys("randomdata/K001").await.unwrap();
        assert_eq!(keys, ["randomdata/K001/a", "randomdata/K001/b"]);
        assert_eq!(backend.list_keys("randomdata").await.unwrap().len(), 4);
        assert_eq!(backend.list_requests(), 2);
    }

    #[tokio::test]
    async fn injected_failures() {
        let backend = InMemoryBackend::new();
        backend.insert("a", "a");
        backend.fail_key("a");
        backend.fail_listing(503);

        let err = backend.get_object("a").await.err().unwrap();
        assert!(err.is_transient());
        let err = backend.list_keys("").await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn returns_contents() {
        let backend = InMemoryBackend::new();
        backend.insert("a", vec![0u8; 1024]);

        let stream = backend.get_object("a").await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(chunks.iter().map(Bytes::len).sum::<usize>(), 1024);
        assert_eq!(backend.get_requests(), 1);

        let err = backend.get_object("b").await.err().unwrap();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }
}
