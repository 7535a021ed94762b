//! Download benchmark for object storage.
//!
//! The benchmark downloads a configurable volume of equally sized objects with a pool of
//! concurrent workers, and reports the wall clock throughput together with the p50, p95 and p99
//! latency to the response headers. Every run produces one [`Datapoint`](datapoint::Datapoint),
//! written to stdout as a single line of JSON.

pub mod benchmark;
pub mod cli;
pub mod config;
pub mod datapoint;
pub mod diagnostics;
pub mod digest;
pub mod downloader;
pub mod error;
pub mod fileset;
pub mod observability;
pub mod plan;
pub mod worklist;
