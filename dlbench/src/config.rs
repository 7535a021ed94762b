//! Configuration for the benchmark binary.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags (see [`cli`](crate::cli))
//! 2. Environment variables (prefixed with `DLBENCH__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `DLBENCH__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `DLBENCH__RUN__WORKERS=32` sets the number of parallel downloads
//! - `DLBENCH__STORAGE__TYPE=filesystem` selects the storage backend
//! - `DLBENCH__STORAGE__PATH=/mnt/data` sets the dataset directory
//!
//! # YAML Configuration File
//!
//! ```yaml
//! run:
//!   environment: c5n.9xlarge
//!   file_set: M004
//!   download_mib: 1024
//!
//! storage:
//!   type: s3
//!   bucket: benchmark-data
//!   region: eu-west-1
//! ```

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dlbench_storage::{
    BoxedBackend, FileSystemBackend, RetryPolicy, RetryingBackend, S3Backend, S3BackendConfig,
    SharedBackend,
};
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, ExposeSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::benchmark::{Benchmark, DEFAULT_PREFIX};
use crate::digest::DigestConfig;
use crate::error::{BenchError, ConfigError};
use crate::plan::RunConfig;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "DLBENCH__";

/// Newtype around `String` that protects against accidental logging of secrets in the
/// configuration. Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

fn expose(secret: &Option<SecretBox<ConfigSecret>>) -> Option<String> {
    secret
        .as_ref()
        .map(|secret| secret.expose_secret().as_str().to_owned())
}

/// Parameters of the benchmark runs.
///
/// These are validated into a [`RunConfig`] before the first request is sent.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Run {
    /// Number of datapoints to generate. Defaults to `1`.
    pub count: usize,

    /// Free-form label of the machine running the benchmark, such as the instance type.
    ///
    /// Defaults to `"unknown"`.
    pub environment: String,

    /// Number of parallel downloads. Defaults to the number of CPU cores.
    pub workers: usize,

    /// Label of the file set to download. Defaults to `"M001"`.
    pub file_set: String,

    /// Total volume to download per run, in MiB. Defaults to `256`.
    pub download_mib: u64,
}

impl Default for Run {
    fn default() -> Self {
        Self {
            count: 1,
            environment: "unknown".to_owned(),
            workers: num_cpus::get(),
            file_set: "M001".to_owned(),
            download_mib: 256,
        }
    }
}

/// Storage backend holding the dataset.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Local filesystem (type `"filesystem"`).
    ///
    /// Keys are paths relative to `path`. Useful to benchmark local disks and network mounts.
    FileSystem {
        /// Root directory of the dataset.
        path: PathBuf,
    },

    /// Amazon S3 or an S3-compatible service (type `"s3"`).
    ///
    /// Without explicit keys, credentials are taken from the standard AWS environment variables,
    /// profile files, or the instance metadata service.
    S3 {
        /// Name of the bucket holding the dataset.
        bucket: String,

        /// Region of the bucket. Defaults to `"us-east-1"`.
        #[serde(default = "default_region")]
        region: String,

        /// Custom endpoint URL, for example `http://localhost:9000` for MinIO.
        #[serde(default)]
        endpoint: Option<String>,

        /// Address the bucket as part of the path instead of the host name.
        #[serde(default)]
        path_style: bool,

        /// Timeout for establishing a connection to the service, for example `30s`.
        ///
        /// This does not bound the duration of a download once connected.
        #[serde(default, with = "humantime_serde")]
        request_timeout: Option<Duration>,

        /// Access key ID.
        #[serde(default)]
        access_key: Option<SecretBox<ConfigSecret>>,

        /// Secret access key.
        #[serde(default)]
        secret_key: Option<SecretBox<ConfigSecret>>,

        /// Session token of temporary credentials.
        #[serde(default)]
        session_token: Option<SecretBox<ConfigSecret>>,
    },
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

impl Default for Storage {
    fn default() -> Self {
        Storage::S3 {
            bucket: String::new(),
            region: default_region(),
            endpoint: None,
            path_style: false,
            request_timeout: None,
            access_key: None,
            secret_key: None,
            session_token: None,
        }
    }
}

/// Retries of failed storage requests.
///
/// Delays grow exponentially from `initial_backoff` up to `max_backoff`, each picked at random
/// below its bound.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Retry {
    /// Total number of attempts per request, including the first one. Defaults to `10`.
    pub max_attempts: u32,

    /// Defaults to `100ms`.
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Defaults to `20s`.
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Retry {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
        }
    }
}

impl Default for Retry {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff: policy.initial_backoff,
            max_backoff: policy.max_backoff,
        }
    }
}

/// Runtime configuration for the Tokio async runtime.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads of the runtime executing the downloads.
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `DLBENCH__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
        }
    }
}

/// [Sentry](https://sentry.io/) error reporting.
///
/// Disabled unless a DSN is configured.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// Sentry DSN. `None` disables the integration.
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name reported with every event.
    pub environment: Option<Cow<'static, str>>,

    /// Sample rate of error events between `0.0` and `1.0`. Defaults to `1.0`.
    pub sample_rate: f32,

    /// Enables debug output of the Sentry SDK.
    pub debug: bool,
}

impl Sentry {
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
            debug: false,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::error::Error for FormatParseError {}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, since stdout carries the datapoints.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level. Overridden by a plain level in `RUST_LOG`. Defaults to `INFO`.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Defaults to [`LogFormat::Auto`].
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Local diagnostics endpoint.
///
/// Serves `/health` and `/debug/runtime` while the benchmark runs. The endpoint only binds to
/// loopback addresses.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Diagnostics {
    pub enabled: bool,

    /// Defaults to `127.0.0.1:6060`.
    pub addr: SocketAddr,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: SocketAddr::from(([127, 0, 0, 1], 6060)),
        }
    }
}

/// Main configuration struct of the benchmark.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub run: Run,

    pub storage: Storage,

    /// Base prefix below which every file set has its own prefix. Defaults to `"randomdata"`.
    pub prefix: String,

    pub retry: Retry,

    pub digest: DigestConfig,

    pub runtime: Runtime,

    pub logging: Logging,

    pub sentry: Sentry,

    pub diagnostics: Diagnostics,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run: Run::default(),
            storage: Storage::default(),
            prefix: DEFAULT_PREFIX.to_owned(),
            retry: Retry::default(),
            digest: DigestConfig::default(),
            runtime: Runtime::default(),
            logging: Logging::default(),
            sentry: Sentry::default(),
            diagnostics: Diagnostics::default(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Validates the run parameters and connects them to the configured storage.
    ///
    /// The run parameters are checked first, so an invalid run is rejected before any storage
    /// client is created.
    pub fn benchmark(&self) -> Result<Benchmark> {
        let run_config = self.run_config().map_err(BenchError::from)?;
        let backend = self.backend()?;

        Ok(Benchmark::new(run_config, backend)
            .with_prefix(self.prefix.clone())
            .with_digest(self.digest))
    }

    /// Validates the run parameters.
    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        RunConfig::with_volume_mib(
            self.run.count,
            self.run.download_mib,
            &self.run.file_set,
            self.run.workers,
            self.run.environment.clone(),
        )
    }

    /// Creates the configured storage backend, wrapped with the configured retries.
    pub fn backend(&self) -> Result<SharedBackend> {
        let backend: BoxedBackend = match &self.storage {
            Storage::FileSystem { path } => Box::new(FileSystemBackend::new(path)),
            Storage::S3 {
                bucket,
                region,
                endpoint,
                path_style,
                request_timeout,
                access_key,
                secret_key,
                session_token,
            } => {
                if bucket.is_empty() {
                    anyhow::bail!("no bucket configured, set `storage.bucket`");
                }

                let backend = S3Backend::new(S3BackendConfig {
                    bucket: bucket.clone(),
                    region: region.clone(),
                    endpoint: endpoint.clone(),
                    path_style: *path_style,
                    request_timeout: *request_timeout,
                    access_key: expose(access_key),
                    secret_key: expose(secret_key),
                    session_token: expose(session_token),
                })
                .context("failed to create S3 backend")?;
                Box::new(backend)
            }
        };

        Ok(Arc::new(RetryingBackend::new(backend, self.retry.policy())))
    }
}
