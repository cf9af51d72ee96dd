use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracegen::{
    ChainSpec, DiscardReporter, JsonReporter, LogReporter, RunConfig, Sampler, ServiceApis,
    SpanReporter, DEFAULT_CHAIN,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tracegen")]
#[command(
    about = "Generate synthetic distributed traces to load-test a tracing backend",
    long_about = None
)]
struct Cli {
    /// Number of concurrent workers
    #[arg(short, long, default_value = "1")]
    workers: usize,

    /// Traces each worker generates (0 = until stopped); ignored when --duration is set
    #[arg(short, long, default_value = "1")]
    traces: usize,

    /// How long to run for, e.g. 500ms, 30s, 5m (overrides --traces)
    #[arg(short, long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Service name of the root spans' tracer
    #[arg(short, long, env = "TRACEGEN_SERVICE_NAME", default_value = "tracegen")]
    service: String,

    /// Comma-separated chain of services to simulate per trace; repeatable.
    /// Prefix a name with `redis-` or `mysql-` to simulate a data store.
    #[arg(short, long = "chain", value_name = "SERVICES")]
    chains: Vec<ChainSpec>,

    /// Operation for ordinary hops, as METHOD:/path; repeatable
    #[arg(long = "api", value_name = "METHOD:PATH")]
    apis: Vec<String>,

    /// Round-trip every root context through a text map
    #[arg(long)]
    marshal: bool,

    /// Flag root spans as debug
    #[arg(long)]
    debug: bool,

    /// Flag root spans as firehose
    #[arg(long)]
    firehose: bool,

    /// Pause before finishing each root span
    #[arg(long, value_parser = parse_duration, default_value = "0s")]
    pause: Duration,

    /// Sample root spans with this probability instead of always
    #[arg(long)]
    sampling_ratio: Option<f64>,

    /// Where finished spans go
    #[arg(short, long, value_enum, default_value_t = ReporterKind::Log)]
    reporter: ReporterKind,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReporterKind {
    /// One log line per span
    Log,
    /// Newline-delimited JSON on stdout
    Json,
    /// Drop every span
    Discard,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<RunConfig> {
        let chains = if self.chains.is_empty() {
            vec![DEFAULT_CHAIN.parse()?]
        } else {
            self.chains
        };

        let apis = if self.apis.is_empty() {
            ServiceApis::default()
        } else {
            ServiceApis::new(self.apis).context("invalid --api")?
        };

        let sampler = match self.sampling_ratio {
            Some(ratio) => Sampler::Probabilistic(ratio),
            None => Sampler::Const(true),
        };

        Ok(RunConfig {
            workers: self.workers,
            traces: self.traces,
            duration: self.duration.unwrap_or_default(),
            service_name: self.service,
            sampler,
            chains,
            apis,
            marshal: self.marshal,
            debug: self.debug,
            firehose: self.firehose,
            pause: self.pause,
        })
    }
}

/// Parse `250ms`, `30s`, `5m`, `1h`, or a bare number of seconds
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (value, unit) = s.split_at(split);
    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration {s:?}"))?;

    let seconds = |scale: u64| {
        value
            .checked_mul(scale)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration {s:?} is too large"))
    };

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => seconds(60),
        "h" => seconds(3600),
        _ => Err(format!("unknown duration unit {unit:?} in {s:?}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so that JSON spans on stdout stay machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let reporter: Arc<dyn SpanReporter> = match cli.reporter {
        ReporterKind::Log => Arc::new(LogReporter),
        ReporterKind::Json => Arc::new(JsonReporter::stdout()),
        ReporterKind::Discard => Arc::new(DiscardReporter),
    };
    let config = cli.into_config()?;

    let stop = CancellationToken::new();
    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received Ctrl-C, finishing in-flight traces");
                stop.cancel();
            }
        }
    });

    let summary = tracegen::run(config, reporter, stop).await?;
    for worker in &summary.workers {
        tracing::debug!(worker = worker.id, traces = worker.traces, "worker summary");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("12"), Ok(Duration::from_secs(12)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("5d").is_err());
        assert_eq!(
            parse_duration("999999999999999999m"),
            Err("duration \"999999999999999999m\" is too large".to_string())
        );
        assert!(parse_duration("999999999999999999h").is_err());
        assert_eq!(
            parse_duration("999999999999999999s"),
            Ok(Duration::from_secs(999_999_999_999_999_999))
        );
    }

    #[test]
    fn defaults_use_builtin_chain_and_apis() {
        let config = Cli::parse_from(["tracegen"]).into_config().unwrap();
        assert_eq!(config.workers, 1);
        assert_eq!(config.traces, 1);
        assert_eq!(config.chains, vec![DEFAULT_CHAIN.parse::<ChainSpec>().unwrap()]);
        assert_eq!(config.apis, ServiceApis::default());
        assert_eq!(config.sampler, Sampler::Const(true));
    }

    #[test]
    fn chains_and_apis_from_flags() {
        let cli = Cli::parse_from([
            "tracegen",
            "--chain",
            "svc-a,svc-b",
            "--chain",
            "redis-cache",
            "--api",
            "GET:/health",
            "--duration",
            "2s",
            "--sampling-ratio",
            "0.5",
        ]);
        let config = cli.into_config().unwrap();
        assert_eq!(config.chains.len(), 2);
        assert_eq!(config.chains[0].services(), ["svc-a", "svc-b"]);
        assert!(config.apis.contains("GET:/health"));
        assert_eq!(config.duration, Duration::from_secs(2));
        assert_eq!(config.sampler, Sampler::Probabilistic(0.5));
    }

    #[test]
    fn malformed_api_is_rejected() {
        let cli = Cli::parse_from(["tracegen", "--api", "health"]);
        assert!(cli.into_config().is_err());
    }
}
