use s3::error::S3Error;
use thiserror::Error;

/// Errors that can occur when talking to a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// IO errors related to payload streaming or file operations.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors stemming from the S3 client before a response status is known.
    ///
    /// These are usually network, TLS or credential errors encountered while sending the request.
    #[error("s3 error: {context}")]
    S3 {
        context: String,
        #[source]
        cause: S3Error,
    },

    /// The storage service answered with an unsuccessful HTTP status.
    #[error("{context}: unexpected status {status}")]
    Status { context: String, status: u16 },

    /// The requested object does not exist.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Any other error stemming from one of the storage backends.
    #[error("storage backend error: {context}")]
    Generic {
        context: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BackendError {
    /// Creates a [`BackendError::Generic`] from an arbitrary error.
    pub fn generic<E>(context: impl Into<String>, cause: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Generic {
            context: context.into(),
            cause: cause.into(),
        }
    }

    /// Returns `true` if retrying the same request may succeed.
    ///
    /// Transport-level failures, request timeouts, throttling and server-side errors are
    /// transient. Missing objects and client errors are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::S3 { cause, .. } => matches!(
                cause,
                S3Error::Io(_) | S3Error::Hyper(_) | S3Error::HttpFail
            ),
            Self::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::NotFound { .. } | Self::Generic { .. } => false,
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
