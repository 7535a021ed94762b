//! Test utilities for the download benchmark.
//!
//! This crate provides logging setup and dataset fixtures shared by the tests of the benchmark
//! crates. See the modules for all available utilities.

pub mod fixtures;
pub mod tracing;
