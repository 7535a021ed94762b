use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::{diagnostics, observability};

/// Measures download throughput and latency of an object storage service.
///
/// Writes one JSON datapoint per run to stdout. Flags take precedence over the configuration file
/// and `DLBENCH__` environment variables.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// number of datapoints to generate
    #[argh(option)]
    count: Option<usize>,

    /// label of the environment, such as the EC2 instance type
    #[argh(option)]
    instance: Option<String>,

    /// number of parallel downloads
    #[argh(option)]
    workers: Option<usize>,

    /// file set to download, for example M001
    #[argh(option)]
    set: Option<String>,

    /// total size to download per run in MiB
    #[argh(option)]
    download: Option<u64>,

    /// print the version and exit
    #[argh(switch)]
    version: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        let run = &mut config.run;
        if let Some(count) = self.count {
            run.count = count;
        }
        if let Some(instance) = self.instance {
            run.environment = instance;
        }
        if let Some(workers) = self.workers {
            run.workers = workers;
        }
        if let Some(set) = self.set {
            run.file_set = set;
        }
        if let Some(download) = self.download {
            run.download_mib = download;
        }
    }
}

/// Bootstrap the runtime and run the benchmark.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    if args.version {
        println!("dlbench {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

    // Sentry should be initialized before creating the async runtime.
    let _sentry_guard = observability::init_sentry(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("dlbench-rt")
        .enable_all()
        .worker_threads(config.runtime.worker_threads.max(1))
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    let cancel = CancellationToken::new();
    let benchmark = config.benchmark()?.with_cancellation(cancel.clone());

    runtime.block_on(async {
        if config.diagnostics.enabled {
            diagnostics::spawn(config.diagnostics.addr, cancel.clone());
        }
        tokio::spawn(cancel_on_interrupt(cancel.clone()));

        let run_config = benchmark.config();
        tracing::info!(
            prefix = %benchmark.storage_prefix(),
            file_set = %run_config.file_set(),
            workers = run_config.workers(),
            count = run_config.count(),
            "Starting benchmark"
        );

        let result = benchmark.run(std::io::stdout()).await;
        cancel.cancel();

        match result {
            Ok(count) => {
                tracing::info!(count, "Benchmark completed");
                Ok(())
            }
            Err(error) => {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    "Benchmark failed"
                );
                Err(error.into())
            }
        }
    })
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() && !cancel.is_cancelled() {
        tracing::warn!("Interrupted, cancelling benchmark");
        cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(flags: &[&str]) -> Args {
        Args::from_args(&["dlbench"], flags).unwrap()
    }

    #[test]
    fn flags_override_config() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("DLBENCH__RUN__WORKERS", "4");
            jail.set_env("DLBENCH__RUN__ENVIRONMENT", "from-env");

            let mut config = Config::load(None).unwrap();
            parse(&[
                "--count", "3", "--workers", "16", "--set", "K256", "--download", "512",
            ])
            .apply(&mut config);

            assert_eq!(config.run.count, 3);
            assert_eq!(config.run.workers, 16);
            assert_eq!(config.run.file_set, "K256");
            assert_eq!(config.run.download_mib, 512);
            assert_eq!(config.run.environment, "from-env");

            Ok(())
        });
    }

    #[test]
    fn instance_sets_environment() {
        figment::Jail::expect_with(|_jail| {
            let mut config = Config::load(None).unwrap();
            parse(&["--instance", "m5.xlarge"]).apply(&mut config);
            assert_eq!(config.run.environment, "m5.xlarge");
            assert_eq!(config.run.count, 1);
            Ok(())
        });
    }

    #[test]
    fn config_path() {
        let args = parse(&["-c", "bench.yml"]);
        assert_eq!(args.config, Some(PathBuf::from("bench.yml")));
        assert!(!args.version);
    }
}
