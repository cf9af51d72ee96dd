use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::catalog::ServiceApis;
use crate::chain::{ChainSimulator, ChainSpec};
use crate::registry::TracerRegistry;
use crate::reporter::SpanReporter;
use crate::tracer::{Sampler, Tracer, TracerConfig, TracerError};
use crate::worker::{Worker, WorkerConfig, WorkerError, WorkerReport};

/// Chain simulated when none is configured
pub const DEFAULT_CHAIN: &str = "frontend,redis-cache,backend,mysql-orders";

/// Settings for a whole generation run
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub workers: usize,
    /// Traces per worker; ignored when `duration` is set
    pub traces: usize,
    /// How long to run for; zero means "until every worker has its traces"
    pub duration: Duration,
    /// Service name of the tracer that emits root spans
    pub service_name: String,
    pub sampler: Sampler,
    pub chains: Vec<ChainSpec>,
    pub apis: ServiceApis,
    pub marshal: bool,
    pub debug: bool,
    pub firehose: bool,
    pub pause: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            traces: 1,
            duration: Duration::ZERO,
            service_name: "tracegen".to_string(),
            sampler: Sampler::Const(true),
            chains: DEFAULT_CHAIN.parse().into_iter().collect(),
            apis: ServiceApis::default(),
            marshal: false,
            debug: false,
            firehose: false,
            pause: Duration::ZERO,
        }
    }
}

impl RunConfig {
    /// Check the run-level settings. The API pool is already checked by
    /// [`ServiceApis::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        if let Sampler::Probabilistic(ratio) = self.sampler {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::InvalidSamplingRatio(ratio));
            }
        }
        Ok(())
    }

    /// Per-worker view of this configuration
    pub fn worker_config(&self, id: usize) -> WorkerConfig {
        WorkerConfig {
            id,
            traces: if self.duration.is_zero() { self.traces } else { 0 },
            marshal: self.marshal,
            debug: self.debug,
            firehose: self.firehose,
            pause: self.pause,
            chains: self.chains.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Reports of every worker, by worker id
    pub workers: Vec<WorkerReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total_traces(&self) -> usize {
        self.workers.iter().map(|w| w.traces).sum()
    }
}

/// Run `config.workers` workers to completion.
///
/// Workers stop when they have generated their traces, when `config.duration` elapses,
/// or when `stop` is cancelled. A worker that cannot get a tracer fails the run: the
/// remaining workers are stopped and the error is returned once they have exited.
pub async fn run(
    config: RunConfig,
    reporter: Arc<dyn SpanReporter>,
    stop: CancellationToken,
) -> Result<RunSummary, RunError> {
    config.validate()?;

    let tracer = Tracer::new(
        TracerConfig::new(config.service_name.clone())
            .with_sampler(config.sampler)
            .with_rpc_metrics(true),
        reporter.clone(),
    )?;
    let registry = TracerRegistry::with_reporter(reporter);
    let simulator = ChainSimulator::new(registry.clone(), Arc::new(config.apis.clone()));

    // Cancelling our own token must not leak into the caller's
    let stop = stop.child_token();

    tracing::info!(
        workers = config.workers,
        traces = config.traces,
        duration = ?config.duration,
        chains = ?config.chains.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "starting trace generation"
    );
    let started = Instant::now();

    if !config.duration.is_zero() {
        let stop = stop.clone();
        let duration = config.duration;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    tracing::info!(?duration, "run duration elapsed, stopping workers");
                    stop.cancel();
                }
                _ = stop.cancelled() => {}
            }
        });
    }

    let mut workers = JoinSet::new();
    for id in 0..config.workers {
        let worker = Worker::new(
            config.worker_config(id),
            tracer.clone(),
            simulator.clone(),
            stop.clone(),
        );
        workers.spawn(worker.run());
    }

    let mut reports = Vec::with_capacity(config.workers);
    let mut failure = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "worker failed, stopping all workers");
                stop.cancel();
                failure.get_or_insert(RunError::Worker(e));
            }
            Err(e) => {
                tracing::error!(error = %e, "worker task failed, stopping all workers");
                stop.cancel();
                failure.get_or_insert(RunError::Join(e));
            }
        }
    }

    // Releases the duration timer if it is still pending
    stop.cancel();

    tracer.flush().await;
    registry.flush_all().await;
    log_metrics(&tracer, &registry);

    if let Some(e) = failure {
        return Err(e);
    }

    reports.sort_by_key(|r| r.id);
    let summary = RunSummary {
        workers: reports,
        elapsed: started.elapsed(),
    };

    tracing::info!(
        traces = summary.total_traces(),
        elapsed = ?summary.elapsed,
        "trace generation finished"
    );

    Ok(summary)
}

fn log_metrics(root: &Tracer, registry: &TracerRegistry) {
    for tracer in std::iter::once(root.clone()).chain(registry.tracers()) {
        let metrics = tracer.metrics();
        tracing::info!(
            service = %tracer.service_name(),
            started = metrics.spans_started,
            finished = metrics.spans_finished,
            errored = metrics.spans_errored,
            not_sampled = metrics.spans_not_sampled,
            "tracer metrics"
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one worker is required")]
    NoWorkers,

    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("sampling ratio {0} is outside [0, 1]")]
    InvalidSamplingRatio(f64),
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create root tracer: {0}")]
    Tracer(#[from] TracerError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("worker task failed: {0}")]
    Join(#[from] JoinError),
}
