use std::sync::Arc;

use dlbench::benchmark::Benchmark;
use dlbench::config::{Config, Storage};
use dlbench::datapoint::Datapoint;
use dlbench::error::{BenchError, ConfigError};
use dlbench::fileset::{KIB, MIB};
use dlbench::plan::RunConfig;
use dlbench_storage::{FileSystemBackend, InMemoryBackend, RetryPolicy, RetryingBackend};
use dlbench_test::fixtures;

const PREFIX: &str = "randomdata";

fn benchmark(backend: &InMemoryBackend, config: RunConfig) -> Benchmark {
    Benchmark::new(config, Arc::new(backend.clone()))
}

#[tokio::test]
async fn collector_ingests_one_sample_per_download() {
    dlbench_test::tracing::init();

    for (objects, files, workers) in [(1, 1, 1), (3, 10, 1), (3, 10, 4), (16, 100, 16), (5, 64, 64)]
    {
        let backend = fixtures::in_memory_dataset(PREFIX, "K001", KIB, objects);
        let config = RunConfig::new(1, files * KIB, "K001", workers, "test").unwrap();
        let benchmark = benchmark(&backend, config);

        let keys = dlbench::worklist::build(&backend, &benchmark.storage_prefix(), files as usize)
            .await
            .unwrap();
        let measurement = benchmark.measure(keys).await.unwrap();

        assert_eq!(measurement.quantiles.count(), files as usize, "{workers} workers");
        assert_eq!(measurement.objects, files);
        assert_eq!(measurement.bytes, files * KIB);
        assert_eq!(backend.get_requests(), files as usize);
    }
}

#[tokio::test]
async fn run_once_produces_datapoint() {
    dlbench_test::tracing::init();

    let backend = fixtures::in_memory_dataset(PREFIX, "K004", 4 * KIB, 8);
    let config = RunConfig::new(1, 40 * 4 * KIB, "K004", 4, "c5n.large").unwrap();

    let datapoint = benchmark(&backend, config).run_once().await.unwrap();

    assert_eq!(datapoint.environment, "c5n.large");
    assert_eq!(datapoint.file_size_label, "K004");
    assert_eq!(datapoint.file_size_bytes, 4 * KIB);
    assert_eq!(datapoint.workers, 4);
    assert_eq!(datapoint.total_size_bytes, 160 * KIB);
    assert!(datapoint.elapsed_secs > 0.0);
    assert!(datapoint.throughput_mibs > 0.0);
    assert!(datapoint.p50_latency <= datapoint.p95_latency);
    assert!(datapoint.p95_latency <= datapoint.p99_latency);
    assert_eq!(backend.list_requests(), 1);
    assert_eq!(backend.get_requests(), 40);
}

#[tokio::test]
async fn run_writes_one_line_per_repetition() {
    let backend = fixtures::in_memory_dataset(PREFIX, "K001", KIB, 4);
    let config = RunConfig::new(3, 8 * KIB, "K001", 2, "test").unwrap();

    let mut output = Vec::new();
    let written = benchmark(&backend, config).run(&mut output).await.unwrap();
    assert_eq!(written, 3);

    let output = String::from_utf8(output).unwrap();
    let lines: Vec<_> = output.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in lines {
        let datapoint: Datapoint = serde_json::from_str(line).unwrap();
        assert_eq!(datapoint.total_size_bytes, 8 * KIB);
    }

    // every repetition lists and downloads independently
    assert_eq!(backend.list_requests(), 3);
    assert_eq!(backend.get_requests(), 24);
}

#[tokio::test]
async fn empty_dataset_produces_no_datapoint() {
    let backend = fixtures::in_memory_dataset(PREFIX, "K004", 4 * KIB, 4);
    let config = RunConfig::new(1, 4 * KIB, "K001", 1, "test").unwrap();

    let mut output = Vec::new();
    let err = benchmark(&backend, config)
        .run(&mut output)
        .await
        .unwrap_err();

    assert!(matches!(err, BenchError::EmptyDataset { prefix } if prefix == "randomdata/K001"));
    assert!(output.is_empty());
    assert_eq!(backend.get_requests(), 0);
}

#[tokio::test]
async fn failed_download_aborts_run() {
    let backend = fixtures::in_memory_dataset(PREFIX, "K001", KIB, 4);
    backend.fail_key(fixtures::object_key(PREFIX, "K001", 2));
    let config = RunConfig::new(2, 400 * KIB, "K001", 4, "test").unwrap();

    let mut output = Vec::new();
    let err = benchmark(&backend, config)
        .run(&mut output)
        .await
        .unwrap_err();

    assert!(matches!(err, BenchError::Download { key, .. } if key.ends_with("00000002")));
    assert!(output.is_empty());
    // the run stops early instead of downloading the remaining objects
    assert!(backend.get_requests() < 400);
}

#[tokio::test]
async fn listing_is_retried_before_failing() {
    let backend = fixtures::in_memory_dataset(PREFIX, "K001", KIB, 2);
    backend.fail_listing(503);

    let retrying = RetryingBackend::new(
        backend.clone(),
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: std::time::Duration::from_millis(1),
            max_backoff: std::time::Duration::from_millis(2),
        },
    );
    let config = RunConfig::new(1, 2 * KIB, "K001", 1, "test").unwrap();

    let err = Benchmark::new(config, Arc::new(retrying))
        .run_once()
        .await
        .unwrap_err();

    assert!(matches!(err, BenchError::Discovery { .. }));
    assert_eq!(backend.list_requests(), 3);
}

#[test]
fn invalid_volume_is_rejected_before_any_request() {
    let root = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage = Storage::FileSystem {
        path: root.path().join("missing"),
    };
    config.run.file_set = "M004".to_owned();
    config.run.download_mib = 6;
    config.run.workers = 1;

    let err = config.benchmark().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BenchError>(),
        Some(BenchError::Config(ConfigError::NotAMultiple {
            volume,
            size
        })) if *volume == 6 * MIB && *size == 4 * MIB
    ));

    // the default storage has no bucket, which is only reported for valid run parameters
    let mut config = Config::default();
    config.run.file_set = "M004".to_owned();
    config.run.download_mib = 6;
    let err = config.benchmark().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BenchError>(),
        Some(BenchError::Config(ConfigError::NotAMultiple { .. }))
    ));
}

#[tokio::test]
async fn filesystem_dataset_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    fixtures::filesystem_dataset(root.path(), "bench", "K016", 16 * KIB, 5).unwrap();

    let backend = FileSystemBackend::new(root.path());
    let config = RunConfig::new(2, 20 * 16 * KIB, "K016", 3, "local").unwrap();
    let benchmark = Benchmark::new(config, Arc::new(backend)).with_prefix("bench");

    let mut output = Vec::new();
    benchmark.run(&mut output).await.unwrap();

    let output = String::from_utf8(output).unwrap();
    assert_eq!(output.lines().count(), 2);
    for line in output.lines() {
        let datapoint: Datapoint = serde_json::from_str(line).unwrap();
        assert_eq!(datapoint.file_size_label, "K016");
        assert_eq!(datapoint.workers, 3);
        assert_eq!(datapoint.environment, "local");
    }
}
