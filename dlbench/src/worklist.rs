//! Building the list of objects downloaded in a run.
//!
//! The work list is drawn from the objects found under the file set's storage prefix. Its order is
//! randomized on every run so that neither the client nor the storage service can benefit from
//! caching objects requested in a predictable order.

use dlbench_storage::Backend;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::BenchError;

/// Lists all keys under `prefix` and assembles a shuffled work list of exactly `files_needed`
/// keys.
///
/// Fails with [`BenchError::Discovery`] if listing fails, and with [`BenchError::EmptyDataset`] if
/// no objects exist under the prefix.
pub async fn build<B>(backend: &B, prefix: &str, files_needed: usize) -> Result<Vec<String>, BenchError>
where
    B: Backend + ?Sized,
{
    let keys = discover(backend, prefix).await?;
    tracing::debug!(
        available = keys.len(),
        files_needed,
        "Discovered objects for work list"
    );

    Ok(assemble(keys, files_needed, &mut rand::rng()))
}

/// Lists all keys under `prefix`, failing if there are none.
pub async fn discover<B>(backend: &B, prefix: &str) -> Result<Vec<String>, BenchError>
where
    B: Backend + ?Sized,
{
    let keys = backend
        .list_keys(prefix)
        .await
        .map_err(|source| BenchError::Discovery {
            prefix: prefix.to_owned(),
            source,
        })?;

    if keys.is_empty() {
        return Err(BenchError::EmptyDataset {
            prefix: prefix.to_owned(),
        });
    }

    Ok(keys)
}

/// Shuffles `keys` once and cycles through them until `files_needed` keys have been produced.
///
/// If there are more keys than needed, the output is a random subset. Otherwise every key occurs
/// at least `files_needed / keys.len()` times. Returns an empty list if `keys` is empty.
pub fn assemble<R>(mut keys: Vec<String>, files_needed: usize, rng: &mut R) -> Vec<String>
where
    R: Rng + ?Sized,
{
    if keys.is_empty() {
        return Vec::new();
    }

    keys.shuffle(rng);

    keys.iter()
        .cycle()
        .take(files_needed)
        .cloned()
        .collect()
}
