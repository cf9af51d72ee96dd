use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::reporter::SpanReporter;
use crate::tracer::{Sampler, Tracer, TracerConfig, TracerError};

/// Builds the tracer for a simulated service on first use
pub trait TracerFactory: Send + Sync + 'static {
    fn create(&self, service_name: &str) -> Result<Tracer, TracerError>;
}

impl<F> TracerFactory for F
where
    F: Fn(&str) -> Result<Tracer, TracerError> + Send + Sync + 'static,
{
    fn create(&self, service_name: &str) -> Result<Tracer, TracerError> {
        self(service_name)
    }
}

/// Tracers that sample everything and keep RPC metrics, all feeding one reporter
pub struct ReporterTracerFactory {
    reporter: Arc<dyn SpanReporter>,
}

impl ReporterTracerFactory {
    pub fn new(reporter: Arc<dyn SpanReporter>) -> Self {
        Self { reporter }
    }
}

impl TracerFactory for ReporterTracerFactory {
    fn create(&self, service_name: &str) -> Result<Tracer, TracerError> {
        let config = TracerConfig::new(service_name)
            .with_sampler(Sampler::Const(true))
            .with_rpc_metrics(true);
        Tracer::new(config, self.reporter.clone())
    }
}

/// Per-service tracer cache.
///
/// Each service name is initialized at most once: concurrent first callers wait on the
/// same initialization and all get the same handle back. A failed initialization leaves
/// the entry empty so a later call can try again.
#[derive(Clone)]
pub struct TracerRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    tracers: DashMap<String, Arc<OnceCell<Tracer>>>,
    factory: Arc<dyn TracerFactory>,
}

impl TracerRegistry {
    pub fn new(factory: impl TracerFactory) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                tracers: DashMap::new(),
                factory: Arc::new(factory),
            }),
        }
    }

    /// Registry using [`ReporterTracerFactory`]
    pub fn with_reporter(reporter: Arc<dyn SpanReporter>) -> Self {
        Self::new(ReporterTracerFactory::new(reporter))
    }

    pub async fn get(&self, service_name: &str) -> Result<Tracer, RegistryError> {
        if let Some(tracer) = self
            .inner
            .tracers
            .get(service_name)
            .and_then(|cell| cell.get().cloned())
        {
            return Ok(tracer);
        }

        // Clone the cell out so no map guard is held across the await below
        let cell = self
            .inner
            .tracers
            .entry(service_name.to_string())
            .or_default()
            .clone();

        let tracer = cell
            .get_or_try_init(|| async {
                tracing::debug!(service = %service_name, "initializing tracer");
                self.inner.factory.create(service_name)
            })
            .await
            .map_err(|source| RegistryError {
                service: service_name.to_string(),
                source,
            })?;

        Ok(tracer.clone())
    }

    /// Every tracer initialized so far
    pub fn tracers(&self) -> Vec<Tracer> {
        self.inner
            .tracers
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tracers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush every initialized tracer
    pub async fn flush_all(&self) {
        for tracer in self.tracers() {
            tracer.flush().await;
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to create tracer for service {service}")]
pub struct RegistryError {
    pub service: String,
    #[source]
    pub source: TracerError,
}
