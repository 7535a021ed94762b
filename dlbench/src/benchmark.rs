//! Coordination of benchmark runs.
//!
//! A run wires three kinds of tasks together through two bounded queues:
//!
//! ```text
//!  feeder ──(work queue)──▶ N download workers ──(latency queue)──▶ collector
//! ```
//!
//! The feeder pushes the shuffled work list onto the work queue and closes it. Workers download
//! objects until the work queue is drained, and report one latency per object. The collector owns
//! the latency digest and records every sample until all workers have dropped their end of the
//! latency queue. Both queues hold at most `min(workers, MAX_QUEUE_CAPACITY)` items, so a slow
//! consumer blocks its producers instead of buffering the whole run in memory.
//!
//! The first failed download cancels the run. A cancelled or failed run never yields a datapoint.

use std::io::Write;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use dlbench_storage::SharedBackend;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::datapoint::Datapoint;
use crate::digest::{DigestConfig, LatencyDigest, Quantiles};
use crate::downloader::{self, WorkerStats};
use crate::error::BenchError;
use crate::plan::RunConfig;
use crate::worklist;

/// Upper bound on the capacity of the work and latency queues.
pub const MAX_QUEUE_CAPACITY: usize = 1024;

/// Base prefix of the dataset if none is configured.
pub const DEFAULT_PREFIX: &str = "randomdata";

/// Raw results of downloading one work list.
#[derive(Debug)]
pub struct Measurement {
    /// Wall clock time from starting the first worker until the last worker finished.
    pub elapsed: Duration,
    /// Latency distribution of all downloads.
    pub quantiles: Quantiles,
    /// Number of objects downloaded.
    pub objects: u64,
    /// Number of body bytes received.
    pub bytes: u64,
}

/// Runs the download benchmark for one validated [`RunConfig`].
#[derive(Debug)]
pub struct Benchmark {
    config: RunConfig,
    backend: SharedBackend,
    prefix: String,
    digest: DigestConfig,
    cancel: CancellationToken,
}

impl Benchmark {
    /// Creates a benchmark downloading from `backend` below the default prefix.
    pub fn new(config: RunConfig, backend: SharedBackend) -> Self {
        Self {
            config,
            backend,
            prefix: DEFAULT_PREFIX.to_owned(),
            digest: DigestConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the base prefix under which the file sets are stored.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the accuracy of the latency digest.
    pub fn with_digest(mut self, digest: DigestConfig) -> Self {
        self.digest = digest;
        self
    }

    /// Sets a token that cancels all runs of this benchmark when triggered.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the parameters of this benchmark.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Returns the storage prefix of the configured file set.
    pub fn storage_prefix(&self) -> String {
        self.config.file_set().storage_prefix(&self.prefix)
    }

    /// Executes all repetitions and writes one JSON line per datapoint to `sink`.
    ///
    /// Each datapoint is written as soon as its run completes. The first failed run aborts the
    /// benchmark. Returns the number of datapoints written.
    pub async fn run<W: Write>(&self, mut sink: W) -> Result<usize, BenchError> {
        let count = self.config.count();

        for repetition in 0..count {
            if self.cancel.is_cancelled() {
                return Err(BenchError::Cancelled);
            }

            let span = tracing::info_span!("run", repetition, count);
            let datapoint = self.run_once().instrument(span).await?;
            datapoint.write_line(&mut sink)?;
        }

        Ok(count)
    }

    /// Executes a single run and returns its datapoint.
    pub async fn run_once(&self) -> Result<Datapoint, BenchError> {
        let prefix = self.storage_prefix();
        let keys = worklist::build(&*self.backend, &prefix, self.config.files_needed()).await?;

        let measurement = self.measure(keys).await?;
        if measurement.bytes != self.config.total_bytes() {
            tracing::warn!(
                expected = self.config.total_bytes(),
                received = measurement.bytes,
                "Downloaded volume differs from the configured volume"
            );
        }

        let datapoint = Datapoint::new(&self.config, measurement.elapsed, &measurement.quantiles)?;
        tracing::info!(
            objects = measurement.objects,
            volume = %ByteSize(measurement.bytes),
            elapsed = ?measurement.elapsed,
            throughput_mibs = datapoint.throughput_mibs,
            p50 = datapoint.p50_latency,
            p99 = datapoint.p99_latency,
            "Run completed"
        );

        Ok(datapoint)
    }

    /// Downloads every key of the work list with the configured number of workers.
    ///
    /// The collector records exactly one latency for every downloaded object. Keys may repeat, in
    /// which case the object is downloaded once per occurrence.
    pub async fn measure(&self, keys: Vec<String>) -> Result<Measurement, BenchError> {
        let workers = self.config.workers();
        let capacity = workers.min(MAX_QUEUE_CAPACITY);
        let cancel = self.cancel.child_token();

        let (work_tx, work_rx) = flume::bounded::<String>(capacity);
        let (latency_tx, mut latency_rx) = mpsc::channel::<f64>(capacity);

        let feeder = tokio::spawn(async move {
            for key in keys {
                // fails once all workers are gone
                if work_tx.send_async(key).await.is_err() {
                    break;
                }
            }
        });

        let digest = self.digest;
        let collector = tokio::spawn(async move {
            let mut digest = LatencyDigest::new(digest);
            while let Some(latency) = latency_rx.recv().await {
                digest.add(latency);
            }
            digest
        });

        let start = Instant::now();
        let mut worker_set = JoinSet::new();
        for id in 0..workers {
            worker_set.spawn(downloader::run_worker(
                id,
                self.backend.clone(),
                work_rx.clone(),
                latency_tx.clone(),
                cancel.clone(),
            ));
        }
        // The workers hold the only remaining handles, so both queues close once they finish.
        drop(work_rx);
        drop(latency_tx);

        let mut totals = WorkerStats::default();
        let mut failure = None;
        while let Some(joined) = worker_set.join_next().await {
            match joined {
                Ok(Ok(stats)) => totals += stats,
                Ok(Err(error)) => {
                    failure.get_or_insert(error);
                }
                Err(error) => {
                    cancel.cancel();
                    failure.get_or_insert(BenchError::Task(error));
                }
            }
        }
        let elapsed = start.elapsed();

        feeder.await?;
        let digest = collector.await?;

        if let Some(error) = failure {
            return Err(error);
        }
        if self.cancel.is_cancelled() {
            return Err(BenchError::Cancelled);
        }
        if digest.count() as u64 != totals.objects {
            tracing::error!(
                samples = digest.count(),
                objects = totals.objects,
                "Latency collector missed samples"
            );
            return Err(BenchError::Collector);
        }

        Ok(Measurement {
            elapsed,
            quantiles: digest.finish(),
            objects: totals.objects,
            bytes: totals.bytes,
        })
    }
}
