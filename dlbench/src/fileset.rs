//! File sets available in the benchmark dataset.
//!
//! A file set is a bucket of objects which all have the same size. The dataset is prepared
//! out-of-band with one storage prefix per file set, for example `randomdata/M001/` for the 1 MiB
//! objects.

use std::fmt;

/// One kibibyte.
pub const KIB: u64 = 1024;
/// One mebibyte.
pub const MIB: u64 = 1024 * KIB;

/// A labeled set of objects with identical size.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FileSetSpec {
    /// The label used to select the file set and to name its storage prefix.
    pub label: &'static str,
    /// The exact size of every object in the set, in bytes.
    pub size: u64,
}

/// All file sets known to the benchmark, ordered by object size.
pub const FILE_SETS: &[FileSetSpec] = &[
    FileSetSpec::new("K001", KIB),
    FileSetSpec::new("K004", 4 * KIB),
    FileSetSpec::new("K016", 16 * KIB),
    FileSetSpec::new("K064", 64 * KIB),
    FileSetSpec::new("K256", 256 * KIB),
    FileSetSpec::new("M001", MIB),
    FileSetSpec::new("M004", 4 * MIB),
    FileSetSpec::new("M016", 16 * MIB),
    FileSetSpec::new("M032", 32 * MIB),
    FileSetSpec::new("M064", 64 * MIB),
    FileSetSpec::new("M128", 128 * MIB),
    FileSetSpec::new("M256", 256 * MIB),
];

impl FileSetSpec {
    const fn new(label: &'static str, size: u64) -> Self {
        Self { label, size }
    }

    /// Looks up a file set by its label.
    pub fn lookup(label: &str) -> Option<Self> {
        FILE_SETS.iter().find(|set| set.label == label).copied()
    }

    /// Returns the storage prefix holding this file set below the given base prefix.
    ///
    /// The prefix has no trailing separator and is matched as a plain string prefix.
    pub fn storage_prefix(&self, base: &str) -> String {
        let base = base.trim_matches('/');
        if base.is_empty() {
            self.label.to_owned()
        } else {
            format!("{base}/{}", self.label)
        }
    }

    /// Returns a comma separated list of all known labels, for error messages.
    pub fn known_labels() -> String {
        let labels: Vec<_> = FILE_SETS.iter().map(|set| set.label).collect();
        labels.join(", ")
    }
}

impl fmt::Display for FileSetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.label, self.size)
    }
}
