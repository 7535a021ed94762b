use std::fmt::Debug;

use crate::PayloadStream;
use crate::error::BackendResult;

/// A type-erased [`Backend`] instance.
pub type BoxedBackend = Box<dyn Backend>;

/// Read access to a set of objects in a storage service.
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Lists the keys of all objects whose key starts with `prefix`.
    ///
    /// Pagination is handled internally, the result is the flat list of keys in the order the
    /// service returned them.
    async fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>>;

    /// Requests the object with the given key.
    ///
    /// Resolves as soon as the response headers have been received. The body is returned as a
    /// stream which must be consumed by the caller.
    async fn get_object(&self, key: &str) -> BackendResult<PayloadStream>;
}

#[async_trait::async_trait]
impl<B: Backend + ?Sized> Backend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>> {
        (**self).list_keys(prefix).await
    }

    async fn get_object(&self, key: &str) -> BackendResult<PayloadStream> {
        (**self).get_object(key).await
    }
}
