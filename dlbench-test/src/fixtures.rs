//! Prepared datasets.
//!
//! The benchmark expects one storage prefix per file set, holding objects of exactly the file
//! set's size. These helpers lay out such a dataset in memory or on disk.

use std::fs;
use std::io;
use std::path::Path;

use bytes::Bytes;
use dlbench_storage::InMemoryBackend;

/// Returns the key of the object with the given index in a file set.
pub fn object_key(prefix: &str, label: &str, index: usize) -> String {
    format!("{prefix}/{label}/{index:08}")
}

/// Creates an in-memory backend holding `objects` objects of `size` bytes under
/// `{prefix}/{label}/`.
pub fn in_memory_dataset(prefix: &str, label: &str, size: u64, objects: usize) -> InMemoryBackend {
    let backend = InMemoryBackend::new();
    add_objects(&backend, prefix, label, size, objects);
    backend
}

/// Adds `objects` objects of `size` bytes under `{prefix}/{label}/` to an existing backend.
pub fn add_objects(backend: &InMemoryBackend, prefix: &str, label: &str, size: u64, objects: usize) {
    let contents = Bytes::from(vec![0xa5; size as usize]);
    for index in 0..objects {
        backend.insert(object_key(prefix, label, index), contents.clone());
    }
}

/// Writes `objects` files of `size` bytes under `{root}/{prefix}/{label}/`.
pub fn filesystem_dataset(
    root: &Path,
    prefix: &str,
    label: &str,
    size: u64,
    objects: usize,
) -> io::Result<()> {
    let contents = vec![0x5a; size as usize];
    for index in 0..objects {
        let path = root.join(object_key(prefix, label, index));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &contents)?;
    }
    Ok(())
}
