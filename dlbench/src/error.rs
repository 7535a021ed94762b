use dlbench_storage::BackendError;
use thiserror::Error;

use crate::digest::DigestError;

/// Invalid or inconsistent run parameters.
///
/// These are detected before any request is sent to the storage service.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The file set label is not one of the known file sets.
    #[error("unknown file set `{label}`, expected one of: {known}")]
    UnknownFileSet { label: String, known: String },

    /// The run would not produce any datapoint.
    #[error("count must be at least 1")]
    NoRepetitions,

    /// The run would not download anything.
    #[error("download size must be at least one file")]
    NothingToDownload,

    /// At least one download worker is required.
    #[error("workers must be at least 1")]
    NoWorkers,

    /// The download volume cannot be split into whole files.
    #[error("download size ({volume} bytes) must be a multiple of the file set size ({size} bytes)")]
    NotAMultiple { volume: u64, size: u64 },

    /// More workers than files would leave workers idle for the entire run.
    #[error("workers ({workers}) is greater than files to download ({files})")]
    TooManyWorkers { workers: usize, files: u64 },
}

/// Errors that abort a benchmark run.
///
/// A failed run never produces a datapoint.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The run configuration is invalid.
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    /// Listing the dataset failed.
    #[error("failed to list objects under `{prefix}`")]
    Discovery {
        prefix: String,
        #[source]
        source: BackendError,
    },

    /// Listing succeeded, but the file set has no objects.
    #[error("no objects found under `{prefix}`")]
    EmptyDataset { prefix: String },

    /// Downloading an object failed after all retries.
    #[error("failed to download `{key}`")]
    Download {
        key: String,
        #[source]
        source: BackendError,
    },

    /// The run was cancelled before it completed.
    #[error("benchmark run cancelled")]
    Cancelled,

    /// The latency collector stopped before all samples were recorded.
    #[error("latency collector stopped before the run completed")]
    Collector,

    /// The latency distribution could not be evaluated.
    #[error("failed to evaluate latency distribution")]
    Digest(#[from] DigestError),

    /// Writing a datapoint to the output failed.
    #[error("failed to write datapoint")]
    Output(#[from] std::io::Error),

    /// A benchmark task panicked or was aborted.
    #[error("benchmark task failed")]
    Task(#[from] tokio::task::JoinError),
}
