//! Synthetic distributed-trace generator.
//!
//! A pool of workers fabricates multi-service call chains (a root span with nested
//! child spans across simulated services), with randomized latency and injected
//! errors, and emits them through per-service tracers to a [`SpanReporter`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tracegen::{run, LogReporter, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig {
//!         workers: 4,
//!         traces: 100,
//!         chains: vec!["frontend,redis-cache,backend".parse()?],
//!         ..RunConfig::default()
//!     };
//!
//!     let summary = run(config, Arc::new(LogReporter), CancellationToken::new()).await?;
//!     println!("generated {} traces", summary.total_traces());
//!     Ok(())
//! }
//! ```

pub mod catalog;
mod chain;
mod registry;
mod reporter;
mod runner;
mod span_builder;
mod store;
mod tracer;
mod worker;

pub use tracegen_protocol::*;

pub use catalog::{BackendFlavor, CatalogError, ServiceApis};
pub use chain::{ChainLatency, ChainSimulator, ChainSpec, ChainSpecError};
pub use registry::{RegistryError, ReporterTracerFactory, TracerFactory, TracerRegistry};
pub use reporter::{DiscardReporter, JsonReporter, LogReporter, ReportError, SpanReporter};
pub use runner::{run, ConfigError, RunConfig, RunError, RunSummary, DEFAULT_CHAIN};
pub use span_builder::{ActiveSpan, IntoAttributeValue, SpanBuilder};
pub use store::TraceStore;
pub use tracer::{Sampler, Tracer, TracerConfig, TracerError, TracerMetrics};
pub use worker::{
    Worker, WorkerConfig, WorkerError, WorkerReport, ROOT_OPERATION, ROOT_PEER_SERVICE,
};
