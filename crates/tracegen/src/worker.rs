use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracegen_protocol::tags;
use tracegen_protocol::{SpanKind, TextMap, TraceContext};

use crate::catalog;
use crate::chain::{ChainSimulator, ChainSpec};
use crate::registry::RegistryError;
use crate::tracer::Tracer;

/// Operation name of every root span
pub const ROOT_OPERATION: &str = "lets-go";

/// `peer.service` of every root span
pub const ROOT_PEER_SERVICE: &str = "tracegen-service";

/// Sampling priority set on root spans of debug workers
const DEBUG_SAMPLING_PRIORITY: u16 = 100;

#[derive(Clone, Debug, Default)]
pub struct WorkerConfig {
    pub id: usize,
    /// Traces to generate before stopping; 0 runs until cancelled
    pub traces: usize,
    /// Round-trip each root context through a text map before using it
    pub marshal: bool,
    pub debug: bool,
    pub firehose: bool,
    /// Slept before each root span is finished
    pub pause: Duration,
    pub chains: Vec<ChainSpec>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    pub traces: usize,
}

/// One simulation loop: a root span per iteration, with every configured chain below it.
///
/// The stop token is checked once per trace, so a cancelled worker always completes the
/// trace it is working on.
pub struct Worker {
    config: WorkerConfig,
    tracer: Tracer,
    simulator: ChainSimulator,
    stop: CancellationToken,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        tracer: Tracer,
        simulator: ChainSimulator,
        stop: CancellationToken,
    ) -> Self {
        Self {
            config,
            tracer,
            simulator,
            stop,
        }
    }

    pub fn id(&self) -> usize {
        self.config.id
    }

    pub async fn run(self) -> Result<WorkerReport, WorkerError> {
        let id = self.config.id;
        let mut traces = 0;

        while !self.stop.is_cancelled() {
            self.simulate_trace().await?;

            traces += 1;
            if self.config.traces != 0 && traces >= self.config.traces {
                break;
            }

            // Chains without downstream hops never sleep
            tokio::task::yield_now().await;
        }

        tracing::info!(worker = id, traces, "Worker {} generated {} traces", id, traces);

        Ok(WorkerReport { id, traces })
    }

    async fn simulate_trace(&self) -> Result<(), WorkerError> {
        let mut root = self
            .tracer
            .span(ROOT_OPERATION)
            .with_kind(SpanKind::Client)
            .with_attribute(tags::PEER_SERVICE, ROOT_PEER_SERVICE)
            .with_attribute(tags::PEER_HOST_IPV4, catalog::random_peer_address())
            .start();

        if self.config.debug {
            root.set_sampling_priority(DEBUG_SAMPLING_PRIORITY);
        }
        if self.config.firehose {
            root.enable_firehose();
        }

        let parent = if self.config.marshal {
            self.round_trip(root.context())
        } else {
            root.context().clone()
        };

        let issued_at = root.start_time();
        let elapsed = self.run_chains(&parent).await?;

        if !self.config.pause.is_zero() {
            tokio::time::sleep(self.config.pause).await;
        }

        root.finish_at(issued_at + elapsed);

        Ok(())
    }

    /// Run every configured chain below `parent`, back to back, returning the
    /// synthetic time they cover together
    async fn run_chains(&self, parent: &TraceContext) -> Result<Duration, WorkerError> {
        let mut elapsed = Duration::ZERO;
        let mut previous = Duration::ZERO;

        for chain in &self.config.chains {
            let latency = self
                .simulator
                .simulate(Some(parent), chain, previous)
                .await
                .map_err(|source| WorkerError::Tracer {
                    worker: self.config.id,
                    source,
                })?;

            previous = latency.total;
            elapsed += latency.elapsed();
        }

        Ok(elapsed)
    }

    /// Inject into a text map and extract again. Failures are logged and the best
    /// context at hand is used instead.
    fn round_trip(&self, context: &TraceContext) -> TraceContext {
        let mut carrier = TextMap::new();
        if let Err(e) = self.tracer.inject(context, &mut carrier) {
            tracing::error!(worker = self.config.id, error = %e, "cannot inject span context");
            return context.clone();
        }

        self.extract_or(&carrier, context)
    }

    fn extract_or(&self, carrier: &TextMap, fallback: &TraceContext) -> TraceContext {
        match self.tracer.extract(carrier) {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::error!(
                    worker = self.config.id,
                    error = %e,
                    "cannot extract span context from text map"
                );
                fallback.clone()
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker {worker} could not get a tracer")]
    Tracer {
        worker: usize,
        #[source]
        source: RegistryError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ServiceApis;
    use crate::registry::TracerRegistry;
    use crate::store::TraceStore;
    use crate::tracer::TracerConfig;
    use std::sync::Arc;
    use tracegen_protocol::{flags, SpanId, TraceId, TRACEPARENT_HEADER};

    fn worker(store: &Arc<TraceStore>) -> Worker {
        let tracer = Tracer::new(TracerConfig::new("tracegen"), store.clone()).unwrap();
        let registry = TracerRegistry::with_reporter(store.clone());
        let simulator = ChainSimulator::new(registry, Arc::new(ServiceApis::default()));
        let config = WorkerConfig {
            marshal: true,
            chains: vec!["frontend,backend".parse().unwrap()],
            ..WorkerConfig::default()
        };
        Worker::new(config, tracer, simulator, CancellationToken::new())
    }

    #[tokio::test]
    async fn uninjectable_context_is_used_as_is() {
        let store = Arc::new(TraceStore::new());
        let worker = worker(&store);

        let zero = TraceContext {
            trace_id: TraceId([0; 16]),
            span_id: SpanId([0; 8]),
            parent_span_id: None,
            flags: flags::SAMPLED,
        };
        assert_eq!(worker.round_trip(&zero), zero);
    }

    #[tokio::test]
    async fn round_trip_preserves_a_valid_context() {
        let store = Arc::new(TraceStore::new());
        let worker = worker(&store);

        let context = TraceContext::new_root();
        let extracted = worker.round_trip(&context);
        assert_eq!(extracted.trace_id, context.trace_id);
        assert_eq!(extracted.span_id, context.span_id);
        assert_eq!(extracted.flags, context.flags);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_carrier_keeps_the_trace_connected() {
        let store = Arc::new(TraceStore::new());
        let worker = worker(&store);

        let root = worker.tracer.span(ROOT_OPERATION).start();
        let mut carrier = TextMap::new();
        carrier.insert(TRACEPARENT_HEADER.to_string(), "not-a-traceparent".to_string());

        let parent = worker.extract_or(&carrier, root.context());
        assert_eq!(&parent, root.context());

        let elapsed = worker.run_chains(&parent).await.unwrap();
        let issued_at = root.start_time();
        let root_id = root.context().span_id;
        root.finish_at(issued_at + elapsed);

        worker.tracer.flush().await;
        worker.simulator.registry().flush_all().await;

        let traces = store.traces();
        assert_eq!(traces.len(), 1);
        let trace = &traces[0];
        assert_eq!(trace.spans.len(), 3);
        assert_eq!(trace.root_span_id, root_id);
        assert_eq!(trace.children(root_id).len(), 1);
    }
}
