//! Streaming estimation of latency quantiles.
//!
//! Latencies are recorded into a [`LatencyDigest`], a bounded-memory sketch with a configurable
//! relative error. Once all samples have been recorded, the digest is consumed by
//! [`LatencyDigest::finish`] into [`Quantiles`], which answer quantile queries. Since queries are
//! only available after `finish`, no sample can be recorded after a quantile has been read.
//!
//! The sketch guarantees that every quantile it reports is within `relative_accuracy` of a value
//! at the requested rank, independent of the latency distribution. Memory is bounded by
//! `max_bins`: with the default accuracy of 0.5%, 4096 bins cover latencies spanning about 17
//! orders of magnitude before the lowest bins are collapsed.

use serde::{Deserialize, Serialize};
use sketches_ddsketch::{Config, DDSketch};
use thiserror::Error;

/// Smallest latency distinguished from zero, in seconds.
const MIN_VALUE: f64 = 1e-9;

/// Accuracy and memory trade-off of the latency sketch.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Maximum relative error of a reported quantile, for example `0.01` for 1%.
    ///
    /// Lower values increase the number of bins required to cover the same range of latencies.
    pub relative_accuracy: f64,

    /// Upper bound on the number of bins kept by the sketch.
    pub max_bins: u32,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            relative_accuracy: 0.005,
            max_bins: 4096,
        }
    }
}

/// Errors returned when reading quantiles.
#[derive(Debug, Error, PartialEq)]
pub enum DigestError {
    /// The requested quantile lies outside of `[0, 1]`.
    #[error("quantile {0} is outside of [0, 1]")]
    InvalidQuantile(f64),

    /// No samples have been recorded.
    #[error("no samples recorded")]
    Empty,

    /// Digests with different accuracy settings cannot be merged.
    #[error("cannot merge digests with different configurations")]
    Incompatible,
}

/// Records latency samples.
pub struct LatencyDigest {
    sketch: DDSketch,
    rejected: u64,
}

impl LatencyDigest {
    /// Creates an empty digest.
    pub fn new(config: DigestConfig) -> Self {
        let config = Config::new(config.relative_accuracy, config.max_bins, MIN_VALUE);
        Self {
            sketch: DDSketch::new(config),
            rejected: 0,
        }
    }

    /// Records a latency in seconds.
    ///
    /// Negative and non-finite values cannot be latencies and are dropped.
    pub fn add(&mut self, seconds: f64) {
        if seconds.is_finite() && seconds >= 0.0 {
            self.sketch.add(seconds);
        } else {
            self.rejected += 1;
            tracing::warn!(seconds, "Dropping invalid latency sample");
        }
    }

    /// Returns the number of recorded samples.
    pub fn count(&self) -> usize {
        self.sketch.count()
    }

    /// Returns the number of samples dropped by [`add`](Self::add).
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Adds all samples recorded by `other` to this digest.
    ///
    /// Both digests must have been created with the same [`DigestConfig`].
    pub fn merge(&mut self, other: &LatencyDigest) -> Result<(), DigestError> {
        self.sketch
            .merge(&other.sketch)
            .map_err(|_| DigestError::Incompatible)?;
        self.rejected += other.rejected;
        Ok(())
    }

    /// Stops recording and returns the quantiles of all recorded samples.
    pub fn finish(self) -> Quantiles {
        Quantiles {
            sketch: self.sketch,
        }
    }
}

impl Default for LatencyDigest {
    fn default() -> Self {
        Self::new(DigestConfig::default())
    }
}

impl std::fmt::Debug for LatencyDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyDigest")
            .field("count", &self.sketch.count())
            .field("rejected", &self.rejected)
            .finish()
    }
}

/// Read-only view of a finished [`LatencyDigest`].
pub struct Quantiles {
    sketch: DDSketch,
}

impl Quantiles {
    /// Returns the approximate value below which the fraction `q` of all samples falls.
    pub fn quantile(&self, q: f64) -> Result<f64, DigestError> {
        if !(0.0..=1.0).contains(&q) {
            return Err(DigestError::InvalidQuantile(q));
        }

        self.sketch
            .quantile(q)
            .ok()
            .flatten()
            .ok_or(DigestError::Empty)
    }

    /// Returns the number of samples.
    pub fn count(&self) -> usize {
        self.sketch.count()
    }

    /// Returns the smallest sample.
    pub fn min(&self) -> Option<f64> {
        self.sketch.min()
    }

    /// Returns the largest sample.
    pub fn max(&self) -> Option<f64> {
        self.sketch.max()
    }

    /// Returns the arithmetic mean of all samples.
    pub fn mean(&self) -> Option<f64> {
        let count = self.sketch.count();
        let sum = self.sketch.sum()?;
        (count > 0).then(|| sum / count as f64)
    }
}

impl std::fmt::Debug for Quantiles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Quantiles")
            .field("count", &self.count())
            .field("min", &self.min())
            .field("max", &self.max())
            .finish_non_exhaustive()
    }
}
