//! Validated parameters of a benchmark run.

use crate::error::ConfigError;
use crate::fileset::{FileSetSpec, MIB};

/// The immutable parameters of a benchmark run.
///
/// A `RunConfig` can only be obtained through [`RunConfig::new`], which rejects inconsistent
/// parameters. Every value handed to the benchmark is therefore known to be valid.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    count: usize,
    total_bytes: u64,
    file_set: FileSetSpec,
    workers: usize,
    environment: String,
}

impl RunConfig {
    /// Validates and assembles the parameters of a run.
    ///
    /// - `count`: number of independent repetitions, each producing one datapoint
    /// - `total_bytes`: volume to download per repetition
    /// - `file_set`: label of the file set to download from
    /// - `workers`: number of concurrent downloads
    /// - `environment`: free-form label of the machine running the benchmark
    pub fn new(
        count: usize,
        total_bytes: u64,
        file_set: &str,
        workers: usize,
        environment: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let file_set = FileSetSpec::lookup(file_set).ok_or_else(|| ConfigError::UnknownFileSet {
            label: file_set.to_owned(),
            known: FileSetSpec::known_labels(),
        })?;

        if count == 0 {
            return Err(ConfigError::NoRepetitions);
        }
        if workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if total_bytes % file_set.size != 0 {
            return Err(ConfigError::NotAMultiple {
                volume: total_bytes,
                size: file_set.size,
            });
        }

        let files = total_bytes / file_set.size;
        if files == 0 {
            return Err(ConfigError::NothingToDownload);
        }
        if workers as u64 > files {
            return Err(ConfigError::TooManyWorkers { workers, files });
        }

        Ok(Self {
            count,
            total_bytes,
            file_set,
            workers,
            environment: environment.into(),
        })
    }

    /// Same as [`new`](Self::new), with the download volume given in MiB.
    pub fn with_volume_mib(
        count: usize,
        volume_mib: u64,
        file_set: &str,
        workers: usize,
        environment: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let total_bytes = volume_mib.saturating_mul(MIB);
        Self::new(count, total_bytes, file_set, workers, environment)
    }

    /// Number of repetitions.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Volume downloaded per repetition, in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// The file set downloaded from.
    pub fn file_set(&self) -> FileSetSpec {
        self.file_set
    }

    /// Number of concurrent download workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Label of the environment the benchmark runs in.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Number of objects downloaded per repetition.
    pub fn files_needed(&self) -> usize {
        (self.total_bytes / self.file_set.size) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_parameters() {
        let config = RunConfig::with_volume_mib(3, 256, "M001", 8, "c5n.large").unwrap();

        assert_eq!(config.count(), 3);
        assert_eq!(config.total_bytes(), 256 * MIB);
        assert_eq!(config.file_set().label, "M001");
        assert_eq!(config.workers(), 8);
        assert_eq!(config.environment(), "c5n.large");
        assert_eq!(config.files_needed(), 256);
    }

    #[test]
    fn rejects_unknown_file_set() {
        let err = RunConfig::with_volume_mib(1, 256, "X001", 1, "").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFileSet { label, .. } if label == "X001"));
    }

    #[test]
    fn rejects_partial_files() {
        let err = RunConfig::with_volume_mib(1, 6, "M004", 1, "").unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotAMultiple {
                volume: 6 * MIB,
                size: 4 * MIB,
            }
        );
    }

    #[test]
    fn rejects_more_workers_than_files() {
        let err = RunConfig::with_volume_mib(1, 256, "M128", 3, "").unwrap_err();
        assert_eq!(
            err,
            ConfigError::TooManyWorkers {
                workers: 3,
                files: 2
            }
        );

        assert!(RunConfig::with_volume_mib(1, 256, "M128", 2, "").is_ok());
    }

    #[test]
    fn rejects_empty_runs() {
        assert_eq!(
            RunConfig::with_volume_mib(0, 256, "M001", 1, ""),
            Err(ConfigError::NoRepetitions)
        );
        assert_eq!(
            RunConfig::with_volume_mib(1, 256, "M001", 0, ""),
            Err(ConfigError::NoWorkers)
        );
        assert_eq!(
            RunConfig::with_volume_mib(1, 0, "M001", 1, ""),
            Err(ConfigError::NothingToDownload)
        );
    }
}
