use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures_util::{StreamExt, TryStreamExt};
use tokio::fs::OpenOptions;
use tokio_util::io::ReaderStream;

use crate::PayloadStream;
use crate::backend::common::Backend;
use crate::error::{BackendError, BackendResult};

/// A backend reading objects from a directory on the local filesystem.
///
/// Object keys are `/`-separated paths relative to the root directory. Like S3 listings, prefixes
/// are matched as plain strings, so `data/K0` matches both `data/K001/a` and `data/K004/b`.
#[derive(Debug)]
pub struct FileSystemBackend {
    path: PathBuf,
}

impl FileSystemBackend {
    /// Creates a backend rooted at the given directory.
    pub fn new(path: &Path) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Backend for FileSystemBackend {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>> {
        tracing::debug!("Listing objects in filesystem backend");

        // Only the directory containing the last prefix segment can hold matching files.
        let directory = match prefix.rsplit_once('/') {
            Some((directory, _)) => directory,
            None => "",
        };

        let mut keys = Vec::new();
        let mut pending = vec![self.path.join(directory)];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Some(key) = relative_key(&self.path, &path) else {
                    continue;
                };
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort_unstable();
        Ok(keys)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn get_object(&self, key: &str) -> BackendResult<PayloadStream> {
        let path = self.path.join(key);
        let file = match OpenOptions::new().read(true).open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(BackendError::NotFound { key: key.into() });
            }
            Err(err) => return Err(err.into()),
        };

        Ok(ReaderStream::new(file).map_err(BackendError::from).boxed())
    }
}

/// Converts a path below `root` into a `/`-separated object key.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();
    Some(segments?.join("/"))
}
