//! The summary record produced by a benchmark run.

use std::io::{self, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::digest::{DigestError, Quantiles};
use crate::fileset::MIB;
use crate::plan::RunConfig;

/// Results of a single benchmark run.
///
/// Datapoints are written as JSON lines for an external collector. The field names are part of
/// that interface and must not change.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Datapoint {
    /// Label of the environment the benchmark ran in.
    #[serde(rename = "EC2Instance")]
    pub environment: String,
    /// Size of every downloaded object.
    pub file_size_bytes: u64,
    /// Label of the file set.
    pub file_size_label: String,
    /// Number of concurrent download workers.
    #[serde(rename = "Goroutines")]
    pub workers: usize,
    /// Volume downloaded in the run.
    pub total_size_bytes: u64,

    /// Wall clock time from starting the first worker until the last worker finished.
    pub elapsed_secs: f64,
    /// Median time from request to response headers, in seconds.
    #[serde(rename = "P50Latency")]
    pub p50_latency: f64,
    /// 95th percentile of the time to response headers, in seconds.
    #[serde(rename = "P95Latency")]
    pub p95_latency: f64,
    /// 99th percentile of the time to response headers, in seconds.
    #[serde(rename = "P99Latency")]
    pub p99_latency: f64,
    /// Downloaded volume in MiB per second of wall clock time.
    #[serde(rename = "ThroughputMiBs")]
    pub throughput_mibs: f64,
}

impl Datapoint {
    /// Assembles the datapoint of a finished run.
    pub fn new(
        config: &RunConfig,
        elapsed: Duration,
        quantiles: &Quantiles,
    ) -> Result<Self, DigestError> {
        let elapsed_secs = elapsed.as_secs_f64();
        let file_set = config.file_set();

        Ok(Self {
            environment: config.environment().to_owned(),
            file_size_bytes: file_set.size,
            file_size_label: file_set.label.to_owned(),
            workers: config.workers(),
            total_size_bytes: config.total_bytes(),

            elapsed_secs,
            p50_latency: quantiles.quantile(0.50)?,
            p95_latency: quantiles.quantile(0.95)?,
            p99_latency: quantiles.quantile(0.99)?,
            throughput_mibs: throughput_mibs(config.total_bytes(), elapsed_secs),
        })
    }

    /// Writes the datapoint as a single line of JSON.
    pub fn write_line<W: Write>(&self, mut writer: W) -> io::Result<()> {
        serde_json::to_writer(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

/// Computes the throughput in MiB/s for `bytes` downloaded in `elapsed_secs`.
pub fn throughput_mibs(bytes: u64, elapsed_secs: f64) -> f64 {
    bytes as f64 / MIB as f64 / elapsed_secs
}
