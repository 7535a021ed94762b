//! The storage layer provides read access to the object-storage dataset that the benchmark
//! downloads from.
//!
//! It exposes a minimal [`Backend`] abstraction with exactly the two capabilities a download
//! benchmark needs: listing the keys under a prefix and fetching an object as a byte stream.
//! Backends for S3-compatible services, the local filesystem and an in-memory store for tests
//! are provided, together with a [`RetryingBackend`] decorator that applies a bounded
//! exponential backoff to transient errors.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod backend;
mod error;
mod retry;

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::BoxStream;

pub use backend::common::{Backend, BoxedBackend};
pub use backend::in_memory::InMemoryBackend;
pub use backend::local_fs::FileSystemBackend;
pub use backend::s3_compatible::{S3Backend, S3BackendConfig};
pub use error::{BackendError, BackendResult};
pub use retry::{RetryPolicy, RetryingBackend};

/// The body of a fetched object, streamed in chunks.
pub type PayloadStream = BoxStream<'static, BackendResult<Bytes>>;

/// A backend handle that can be shared between concurrent downloaders.
pub type SharedBackend = Arc<dyn Backend>;
