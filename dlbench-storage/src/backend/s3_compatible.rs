use std::fmt;
use std::time::Duration;

use futures_util::{StreamExt, TryStreamExt};
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};

use crate::PayloadStream;
use crate::backend::common::Backend;
use crate::error::{BackendError, BackendResult};

/// Configuration for [`S3Backend`].
#[derive(Debug, Default)]
pub struct S3BackendConfig {
    /// Name of the bucket holding the dataset.
    pub bucket: String,
    /// Region of the bucket, for example `us-east-1`.
    pub region: String,
    /// Custom endpoint for S3-compatible services. Defaults to the AWS endpoint of the region.
    pub endpoint: Option<String>,
    /// Use path-style instead of virtual-host-style addressing.
    pub path_style: bool,
    /// Timeout for establishing a connection. Downloads in progress are not bounded by it.
    pub request_timeout: Option<Duration>,
    /// Access key ID. When unset, the standard AWS credential chain is used.
    pub access_key: Option<String>,
    /// Secret access key.
    pub secret_key: Option<String>,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

/// A backend reading from an S3-compatible object storage service.
pub struct S3Backend {
    bucket: Box<Bucket>,
}

impl S3Backend {
    /// Creates a new S3 backend bound to the given bucket.
    ///
    /// Credentials are resolved eagerly. If no access key is configured, they are loaded from the
    /// environment, the shared profile or the instance metadata service.
    pub fn new(config: S3BackendConfig) -> BackendResult<Self> {
        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            config.session_token.as_deref(),
            None,
        )
        .map_err(|cause| BackendError::generic("failed to load S3 credentials", cause))?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: match config.endpoint {
                Some(endpoint) => endpoint,
                None => format!("s3.{}.amazonaws.com", config.region),
            },
        };

        let mut bucket: Box<Bucket> = Bucket::new(&config.bucket, region, credentials)
            .map_err(|cause| s3_error("failed to configure bucket".into(), cause))?
            .into();

        if config.path_style {
            bucket = bucket.with_path_style().into();
        }

        if let Some(request_timeout) = config.request_timeout {
            bucket = bucket
                .with_request_timeout(request_timeout)
                .map_err(|cause| s3_error("failed to set request timeout".into(), cause))?
                .into();
        }

        Ok(Self { bucket })
    }
}

impl fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket.name())
            .field("endpoint", &self.bucket.host())
            .finish_non_exhaustive()
    }
}

/// Splits unsuccessful responses from transport errors so that retries can tell them apart.
fn s3_error(context: String, cause: S3Error) -> BackendError {
    match cause {
        S3Error::HttpFailWithBody(status, _) => BackendError::Status { context, status },
        cause => BackendError::S3 { context, cause },
    }
}

/// Like [`s3_error`], but reports a missing object as [`BackendError::NotFound`].
fn get_error(key: &str, cause: S3Error) -> BackendError {
    match s3_error(format!("failed to get `{key}`"), cause) {
        BackendError::Status { status: 404, .. } => BackendError::NotFound {
            key: key.to_owned(),
        },
        err => err,
    }
}

#[async_trait::async_trait]
impl Backend for S3Backend {
    fn name(&self) -> &'static str {
        "s3"
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>> {
        tracing::debug!("Listing objects in s3 backend");

        let pages = self
            .bucket
            .list(prefix.to_owned(), None)
            .await
            .map_err(|cause| s3_error(format!("failed to list objects under `{prefix}`"), cause))?;

        let keys: Vec<String> = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .collect();

        tracing::debug!(count = keys.len(), "Listed objects");
        Ok(keys)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn get_object(&self, key: &str) -> BackendResult<PayloadStream> {
        let response = self
            .bucket
            .get_object_stream(key)
            .await
            .map_err(|cause| get_error(key, cause))?;

        let status = response.status_code;
        if !(200..300).contains(&status) {
            return Err(BackendError::Status {
                context: format!("failed to get `{key}`"),
                status,
            });
        }

        let context = format!("failed to read body of `{key}`");
        let stream = response
            .bytes
            .map_err(move |cause| BackendError::S3 {
                context: context.clone(),
                cause,
            })
            .boxed();

        Ok(stream)
    }
}
