use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracegen_protocol::*;

use crate::reporter::SpanReporter;
use crate::span_builder::SpanBuilder;

const BATCH_SIZE: usize = 100;
const BATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Sampling decision applied to root spans. Child spans inherit their parent's decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sampler {
    Const(bool),
    Probabilistic(f64),
}

impl Sampler {
    fn validate(&self) -> Result<(), TracerError> {
        match *self {
            Sampler::Probabilistic(ratio) if !(0.0..=1.0).contains(&ratio) => {
                Err(TracerError::InvalidSampler(ratio))
            }
            _ => Ok(()),
        }
    }

    fn sample(&self) -> bool {
        match *self {
            Sampler::Const(decision) => decision,
            Sampler::Probabilistic(ratio) => rand::thread_rng().gen_bool(ratio),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TracerConfig {
    pub service_name: String,
    pub sampler: Sampler,
    pub rpc_metrics: bool,
}

impl TracerConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            sampler: Sampler::Const(true),
            rpc_metrics: false,
        }
    }

    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_rpc_metrics(mut self, enabled: bool) -> Self {
        self.rpc_metrics = enabled;
        self
    }
}

pub(crate) enum Command {
    Span(Box<Span>),
    Flush(oneshot::Sender<()>),
}

/// Point-in-time copy of a tracer's span counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TracerMetrics {
    pub spans_started: u64,
    pub spans_finished: u64,
    pub spans_errored: u64,
    pub spans_not_sampled: u64,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    finished: AtomicU64,
    errored: AtomicU64,
    not_sampled: AtomicU64,
}

/// Main entry point for creating spans.
///
/// Cloning is cheap: clones share the same reporter pipeline and counters.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("service_name", &self.inner.service_name)
            .field("sampler", &self.inner.sampler)
            .finish_non_exhaustive()
    }
}

struct TracerInner {
    service_name: String,
    sampler: Sampler,
    rpc_metrics: bool,
    counters: Counters,
    span_tx: mpsc::UnboundedSender<Command>,
}

impl Tracer {
    /// Create a tracer that hands finished spans to `reporter`.
    ///
    /// Must be called from within a Tokio runtime: finished spans are batched by a
    /// background task, flushed every 100ms or whenever 100 spans have piled up.
    pub fn new(config: TracerConfig, reporter: Arc<dyn SpanReporter>) -> Result<Self, TracerError> {
        if config.service_name.trim().is_empty() {
            return Err(TracerError::EmptyServiceName);
        }
        config.sampler.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TracerError::NoRuntime)?;

        let (span_tx, span_rx) = mpsc::unbounded_channel();
        runtime.spawn(run_batcher(config.service_name.clone(), span_rx, reporter));

        tracing::debug!(
            service = %config.service_name,
            sampler = ?config.sampler,
            "tracer created"
        );

        let inner = Arc::new(TracerInner {
            service_name: config.service_name,
            sampler: config.sampler,
            rpc_metrics: config.rpc_metrics,
            counters: Counters::default(),
            span_tx,
        });

        Ok(Self { inner })
    }

    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    /// Start building a new span
    pub fn span(&self, name: impl Into<String>) -> SpanBuilder {
        SpanBuilder::new(name.into(), self.clone())
    }

    /// Serialize `context` into a text-map carrier
    pub fn inject(
        &self,
        context: &TraceContext,
        carrier: &mut TextMap,
    ) -> Result<(), TraceContextError> {
        context.inject(carrier)
    }

    /// Reconstruct a context previously written with [`Tracer::inject`]
    pub fn extract(&self, carrier: &TextMap) -> Result<TraceContext, TraceContextError> {
        TraceContext::extract(carrier)
    }

    /// Counters are only maintained when the tracer was built with RPC metrics enabled.
    pub fn metrics(&self) -> TracerMetrics {
        let counters = &self.inner.counters;
        TracerMetrics {
            spans_started: counters.started.load(Ordering::Relaxed),
            spans_finished: counters.finished.load(Ordering::Relaxed),
            spans_errored: counters.errored.load(Ordering::Relaxed),
            spans_not_sampled: counters.not_sampled.load(Ordering::Relaxed),
        }
    }

    /// Whether two handles point at the same tracer instance
    pub fn ptr_eq(a: &Tracer, b: &Tracer) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Wait until every span finished so far has been handed to the reporter
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.inner.span_tx.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub(crate) fn sample_root(&self) -> bool {
        self.inner.sampler.sample()
    }

    pub(crate) fn record_started(&self) {
        if self.inner.rpc_metrics {
            self.inner.counters.started.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_finished(&self, span: Span) {
        if self.inner.rpc_metrics {
            let counters = &self.inner.counters;
            counters.finished.fetch_add(1, Ordering::Relaxed);
            if span.is_error() {
                counters.errored.fetch_add(1, Ordering::Relaxed);
            }
        }

        if span.flags & flags::SAMPLED == 0 {
            if self.inner.rpc_metrics {
                self.inner.counters.not_sampled.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }

        let _ = self.inner.span_tx.send(Command::Span(Box::new(span)));
    }
}

async fn run_batcher(
    service_name: String,
    mut span_rx: mpsc::UnboundedReceiver<Command>,
    reporter: Arc<dyn SpanReporter>,
) {
    let mut batch = Vec::new();
    let mut interval = tokio::time::interval(BATCH_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if !batch.is_empty() {
                    deliver(reporter.as_ref(), &service_name, std::mem::take(&mut batch));
                }
            }
            command = span_rx.recv() => match command {
                Some(Command::Span(span)) => {
                    batch.push(*span);
                    if batch.len() >= BATCH_SIZE {
                        deliver(reporter.as_ref(), &service_name, std::mem::take(&mut batch));
                    }
                }
                Some(Command::Flush(ack)) => {
                    if !batch.is_empty() {
                        deliver(reporter.as_ref(), &service_name, std::mem::take(&mut batch));
                    }
                    let _ = ack.send(());
                }
                None => break,
            },
        }
    }

    // Flush remaining spans on shutdown
    if !batch.is_empty() {
        deliver(reporter.as_ref(), &service_name, batch);
    }
}

fn deliver(reporter: &dyn SpanReporter, service_name: &str, spans: Vec<Span>) {
    let count = spans.len();
    if let Err(e) = reporter.report(spans) {
        tracing::warn!(service = %service_name, count, error = %e, "failed to report spans");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TracerError {
    #[error("service name must not be empty")]
    EmptyServiceName,

    #[error("sampling ratio {0} is outside [0, 1]")]
    InvalidSampler(f64),

    #[error("tracer must be created from within a Tokio runtime")]
    NoRuntime,
}
