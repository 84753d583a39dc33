use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use clap::Parser;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::error;
use tracing_subscriber::EnvFilter;

use water_extract::{
    BatchJob, ConfigError, ConfigFile, ExtractClient, ExtractConfig, RunResult, SignalPolicy,
};

#[derive(Debug, Parser)]
#[command(name = "water-extract")]
#[command(about = "Fetch watershed time series and store them as regular-interval series")]
#[command(version)]
struct Cli {
    /// Configuration file for a single run. Created with defaults when missing.
    #[arg(long, required_unless_present = "batch", conflicts_with = "batch")]
    config: Option<PathBuf>,

    /// Configuration files run one after another, each into its own store.
    #[arg(long, num_args = 1.., value_name = "CONFIG")]
    batch: Vec<PathBuf>,

    /// Fetch executable; defaults to `WATER_EXTRACT_BINARY` or `cavi` on `PATH`.
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Store file, overriding the configuration's `dss` key.
    #[arg(long, conflicts_with = "batch")]
    output: Option<PathBuf>,

    /// Window start (RFC 3339), overriding the configuration.
    #[arg(long, value_parser = parse_time)]
    after: Option<OffsetDateTime>,

    /// Window end (RFC 3339), overriding the configuration.
    #[arg(long, value_parser = parse_time)]
    before: Option<OffsetDateTime>,

    /// End the run at the first error object from the fetch process.
    #[arg(long)]
    abort_on_signal: bool,

    /// Seconds of stdout silence tolerated between records; 0 waits forever.
    #[arg(long, value_name = "SECS")]
    read_timeout_secs: Option<u64>,
}

fn parse_time(raw: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|err| format!("`{raw}` is not RFC 3339: {err}"))
}

fn load_job(cli: &Cli, path: &Path) -> Result<(ExtractConfig, BatchJob), ConfigError> {
    let mut config = ConfigFile::new(path).read()?;
    if cli.after.is_some() {
        config.after = cli.after;
    }
    if cli.before.is_some() {
        config.before = cli.before;
    }
    let request = config.to_request()?;
    let sink_path = cli
        .output
        .clone()
        .or_else(|| config.dss.clone())
        .ok_or(ConfigError::MissingKey { key: "dss" })?;
    Ok((config, BatchJob::new(request, sink_path)))
}

fn report(result: &RunResult) {
    println!("{result}");
    for failure in &result.failures {
        println!("  skipped {failure}");
    }
    for signal in &result.signals {
        println!("  fetch error: {signal}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths: Vec<PathBuf> = match &cli.config {
        Some(path) => vec![path.clone()],
        None => cli.batch.clone(),
    };

    let mut builder = ExtractClient::builder();
    let mut jobs = Vec::with_capacity(paths.len());
    for path in &paths {
        match load_job(&cli, path) {
            Ok((config, job)) => {
                for (code, mapping) in config.codes {
                    builder = builder.code(code, mapping);
                }
                jobs.push(job);
            }
            Err(err) => {
                error!(config = %path.display(), error = %err, "configuration unusable");
                return ExitCode::from(2);
            }
        }
    }

    if let Some(binary) = &cli.binary {
        builder = builder.binary(binary);
    }
    if cli.abort_on_signal {
        builder = builder.signal_policy(SignalPolicy::Abort);
    }
    if let Some(secs) = cli.read_timeout_secs {
        builder = builder.read_timeout(Duration::from_secs(secs));
    }
    let client = builder.build();

    let results = client.run_batch(jobs).await;
    for result in &results {
        report(result);
    }
    if results.iter().all(RunResult::is_success) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
