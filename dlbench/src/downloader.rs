//! Download workers.
//!
//! Each worker pulls keys from the shared work queue, downloads the full object, and reports the
//! latency to the response headers on the latency queue. Workers are not synchronized with each
//! other: each starts issuing requests as soon as it is scheduled.

use std::time::{Duration, Instant};

use dlbench_storage::{Backend, BackendError, SharedBackend};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::BenchError;

/// Totals of the downloads completed by one worker.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WorkerStats {
    /// Number of objects downloaded.
    pub objects: u64,
    /// Number of body bytes received.
    pub bytes: u64,
}

impl std::ops::AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.objects += other.objects;
        self.bytes += other.bytes;
    }
}

/// Latency and size of a single completed download.
#[derive(Clone, Copy, Debug)]
pub struct Download {
    /// Time from issuing the request until the response headers were received.
    pub latency: Duration,
    /// Number of body bytes received.
    pub bytes: u64,
}

/// Requests the object, measures the time to the response headers, and drains the body.
///
/// The body is read in full and discarded, so that connections are returned to the pool in a
/// reusable state and no payload is retained in memory.
pub async fn fetch<B>(backend: &B, key: &str) -> Result<Download, BackendError>
where
    B: Backend + ?Sized,
{
    let start = Instant::now();
    let mut stream = backend.get_object(key).await?;
    let latency = start.elapsed();

    let mut bytes = 0;
    while let Some(chunk) = stream.next().await {
        bytes += chunk?.len() as u64;
    }

    Ok(Download { latency, bytes })
}

/// Runs a download worker until the work queue is closed and drained.
///
/// The first failed download cancels `cancel`, which stops all other workers of the run, and is
/// returned as [`BenchError::Download`]. If the run is cancelled by someone else, the worker stops
/// after its current download and returns the totals so far.
pub async fn run_worker(
    id: usize,
    backend: SharedBackend,
    work: flume::Receiver<String>,
    latencies: mpsc::Sender<f64>,
    cancel: CancellationToken,
) -> Result<WorkerStats, BenchError> {
    let mut stats = WorkerStats::default();

    loop {
        let key = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            key = work.recv_async() => match key {
                Ok(key) => key,
                // all keys have been handed out
                Err(_) => break,
            },
        };

        let download = match fetch(&*backend, &key).await {
            Ok(download) => download,
            Err(source) => {
                cancel.cancel();
                tracing::error!(
                    worker = id,
                    key = %key,
                    error = &source as &dyn std::error::Error,
                    "Download failed"
                );
                return Err(BenchError::Download { key, source });
            }
        };

        tracing::trace!(worker = id, key = %key, latency = ?download.latency, "Downloaded object");
        stats += WorkerStats {
            objects: 1,
            bytes: download.bytes,
        };

        if latencies
            .send(download.latency.as_secs_f64())
            .await
            .is_err()
        {
            cancel.cancel();
            return Err(BenchError::Collector);
        }
    }

    tracing::debug!(worker = id, objects = stats.objects, "Worker finished");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dlbench_storage::InMemoryBackend;

    use super::*;

    #[tokio::test]
    async fn fetch_drains_body() {
        let backend = InMemoryBackend::new();
        backend.insert("a", vec![7u8; 4096]);

        let download = fetch(&backend, "a").await.unwrap();
        assert_eq!(download.bytes, 4096);
    }

    #[tokio::test]
    async fn worker_drains_queue() {
        let backend = InMemoryBackend::new();
        backend.insert("a", vec![0u8; 16]);
        backend.insert("b", vec![0u8; 16]);

        let (work_tx, work_rx) = flume::bounded(4);
        let (latency_tx, mut latency_rx) = mpsc::channel(4);
        for key in ["a", "b", "a"] {
            work_tx.send(key.to_owned()).unwrap();
        }
        drop(work_tx);

        let stats = run_worker(
            0,
            Arc::new(backend.clone()),
            work_rx,
            latency_tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(stats, WorkerStats { objects: 3, bytes: 48 });
        assert_eq!(backend.get_requests(), 3);

        let mut samples = 0;
        while latency_rx.recv().await.is_some() {
            samples += 1;
        }
        assert_eq!(samples, 3);
    }

    #[tokio::test]
    async fn failure_cancels_run() {
        let backend = InMemoryBackend::new();
        backend.insert("a", "a");
        backend.fail_key("a");

        let (work_tx, work_rx) = flume::bounded(1);
        let (latency_tx, _latency_rx) = mpsc::channel(1);
        work_tx.send("a".to_owned()).unwrap();

        let cancel = CancellationToken::new();
        let result = run_worker(0, Arc::new(backend), work_rx, latency_tx, cancel.clone()).await;

        assert!(matches!(result, Err(BenchError::Download { key, .. }) if key == "a"));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let backend = InMemoryBackend::new();
        backend.insert("a", "a");

        let (work_tx, work_rx) = flume::bounded(1);
        let (latency_tx, _latency_rx) = mpsc::channel(1);
        work_tx.send("a".to_owned()).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = run_worker(0, Arc::new(backend.clone()), work_rx, latency_tx, cancel)
            .await
            .unwrap();

        assert_eq!(stats.objects, 0);
        assert_eq!(backend.get_requests(), 0);
        drop(work_tx);
    }
}
