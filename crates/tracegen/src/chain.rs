//! Simulation of one call chain: a server span for the chain's entry service and a
//! client span for every downstream hop, with synthetic timestamps.

use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracegen_protocol::tags;
use tracegen_protocol::{SpanKind, TraceContext};

use crate::catalog::{self, BackendFlavor, ServiceApis};
use crate::registry::{RegistryError, TracerRegistry};
use crate::span_builder::ActiveSpan;

/// Ordered list of services a request travels through, e.g. `frontend,redis-cache,backend`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSpec {
    services: Vec<String>,
}

impl ChainSpec {
    pub fn new<I, S>(services: I) -> Result<Self, ChainSpecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let services: Vec<String> = services.into_iter().map(Into::into).collect();
        if services.is_empty() {
            return Err(ChainSpecError::Empty);
        }
        if let Some(position) = services.iter().position(|s| s.trim().is_empty()) {
            return Err(ChainSpecError::EmptyService { position });
        }
        Ok(Self { services })
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Entry service; its name keys the tracer used for the whole chain
    pub fn first(&self) -> &str {
        &self.services[0]
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl FromStr for ChainSpec {
    type Err = ChainSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ChainSpecError::Empty);
        }
        Self::new(s.split(',').map(str::trim))
    }
}

impl fmt::Display for ChainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.services.join(","))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChainSpecError {
    #[error("a chain needs at least one service")]
    Empty,

    #[error("service name at position {position} is empty")]
    EmptyService { position: usize },
}

/// Latency accumulated over one chain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChainLatency {
    /// Synthetic latency of the chain's hops
    pub total: Duration,
    /// Jitter actually slept between hops
    pub slept: Duration,
}

impl ChainLatency {
    /// Fold one hop into the running totals.
    ///
    /// Hop durations add up; when a single hop plus its pause outgrows everything so
    /// far, it becomes the new total and its pause is charged to `slept` a second time.
    pub fn add_hop(&mut self, duration: Duration, pause: Duration) {
        self.total += duration;
        self.slept += pause;
        if self.total < duration + pause {
            self.total = duration + pause;
            self.slept += pause;
        }
    }

    /// Span of the chain's entry span: `total + slept`
    pub fn elapsed(&self) -> Duration {
        self.total + self.slept
    }
}

/// Everything decided up front for a single hop
struct Hop<'a> {
    /// Name used for `peer.service`: the flavor name for backend hops
    service: &'a str,
    operation: &'a str,
    /// Flavor and table name for backend hops
    backend: Option<(BackendFlavor, &'a str)>,
    duration: Duration,
}

impl<'a> Hop<'a> {
    fn plan<R: Rng + ?Sized>(rng: &mut R, raw: &'a str, apis: &'a ServiceApis) -> Self {
        let duration = catalog::random_span_duration();

        match BackendFlavor::parse(raw) {
            Some((flavor, table)) => Hop {
                service: flavor.name(),
                operation: flavor.pick_operation(rng),
                backend: Some((flavor, table)),
                duration,
            },
            None => Hop {
                service: raw,
                operation: apis.pick(rng),
                backend: None,
                duration,
            },
        }
    }

    fn tag(&self, span: &mut ActiveSpan) {
        let mut rng = rand::thread_rng();

        span.set_attribute(tags::PEER_SERVICE, self.service);
        span.set_attribute(tags::PEER_HOST_IPV4, catalog::random_peer_address());

        match self.backend {
            Some((flavor, table)) => {
                span.set_attribute(tags::DB_TYPE, flavor.name());
                span.set_attribute(tags::DB_INSTANCE, catalog::random_ipv4().to_string());
                span.set_attribute(
                    tags::DB_STATEMENT,
                    format!(
                        "{} * FROM `{}` WHERE service=`{}`",
                        self.operation.to_uppercase(),
                        table,
                        flavor.name()
                    ),
                );
            }
            None => {
                let (method, path) = catalog::split_api(self.operation);
                span.set_attribute(tags::HTTP_METHOD, method);
                span.set_attribute(tags::HTTP_URL, path);
            }
        }

        // Roughly one hop in five fails
        let rn: usize = rng.gen_range(0..100);
        if rn % 11 == 0 || rn % 13 == 0 || rn % 17 == 0 {
            if self.backend.is_none() {
                span.set_attribute(tags::HTTP_STATUS_CODE, 500 + rng.gen_range(0..4u16));
            }
            span.log_error(
                format!("invoke service {} with error", self.service),
                [("trace-error", catalog::random_words(rn))],
            );
        } else if self.backend.is_none() {
            span.set_attribute(tags::HTTP_STATUS_CODE, 200u16);
        }
    }
}

/// Emits the spans of a chain through per-service tracers
#[derive(Clone)]
pub struct ChainSimulator {
    registry: TracerRegistry,
    apis: Arc<ServiceApis>,
}

impl ChainSimulator {
    pub fn new(registry: TracerRegistry, apis: Arc<ServiceApis>) -> Self {
        Self { registry, apis }
    }

    pub fn registry(&self) -> &TracerRegistry {
        &self.registry
    }

    /// Simulate `chain` below `parent`, after first sleeping `incoming` so that chains
    /// run back to back inside one trace don't overlap.
    ///
    /// Only jitter between hops is slept for real. Every span is finished at its start
    /// plus a synthetic duration; the entry span covers the whole chain and is finished
    /// last, at its start plus [`ChainLatency::elapsed`].
    pub async fn simulate(
        &self,
        parent: Option<&TraceContext>,
        chain: &ChainSpec,
        incoming: Duration,
    ) -> Result<ChainLatency, RegistryError> {
        if !incoming.is_zero() {
            tokio::time::sleep(incoming).await;
        }

        let tracer = self.registry.get(chain.first()).await?;

        let mut parent = parent.cloned();
        let mut entry_span: Option<ActiveSpan> = None;
        let mut latency = ChainLatency::default();

        for (position, raw) in chain.services().iter().enumerate() {
            let hop = {
                let mut rng = rand::thread_rng();
                Hop::plan(&mut rng, raw, &self.apis)
            };

            let pause = if position > 0 {
                catalog::random_pause_duration(hop.duration).await
            } else {
                Duration::ZERO
            };

            let is_server = position == 0 && hop.backend.is_none();
            let builder = tracer.span(hop.operation);
            let builder = match (&parent, is_server) {
                (Some(parent), true) => builder.server_of(parent),
                (None, true) => builder.with_kind(SpanKind::Server),
                (Some(parent), false) => builder.child_of(parent).with_kind(SpanKind::Client),
                (None, false) => builder.with_kind(SpanKind::Client),
            };

            let mut span = builder.start();
            hop.tag(&mut span);

            // Backend hops are leaves, except when one has to anchor a standalone chain
            if hop.backend.is_none() || parent.is_none() {
                parent = Some(span.context().clone());
            }

            if position == 0 {
                entry_span = Some(span);
            } else {
                let start = span.start_time();
                span.finish_at(start + hop.duration);
            }

            latency.add_hop(hop.duration, pause);
        }

        if let Some(span) = entry_span {
            let start = span.start_time();
            span.finish_at(start + latency.elapsed());
        }

        Ok(latency)
    }
}
