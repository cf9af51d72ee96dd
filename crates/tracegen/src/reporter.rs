//! Sinks for finished spans.
//!
//! A tracer batches finished, sampled spans and hands each batch to a [`SpanReporter`].
//! None of the reporters here talk to the network: the generator's output is meant to be
//! picked up by whatever is consuming the process output, or inspected in-process.

use parking_lot::Mutex;
use std::io::{self, Write};
use tracegen_protocol::Span;

pub trait SpanReporter: Send + Sync + 'static {
    fn report(&self, spans: Vec<Span>) -> Result<(), ReportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write spans: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode span: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Emits one structured log event per span
#[derive(Debug, Default)]
pub struct LogReporter;

impl SpanReporter for LogReporter {
    fn report(&self, spans: Vec<Span>) -> Result<(), ReportError> {
        for span in spans {
            let duration_ms = span.duration_nanos().unwrap_or_default() as f64 / 1_000_000.0;
            tracing::info!(
                target: "tracegen::span",
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                parent_span_id = ?span.parent_span_id.map(|id| id.to_hex()),
                service = %span.service_name,
                operation = %span.name,
                start = %span.start_time,
                duration_ms,
                error = span.is_error(),
                "span finished"
            );
        }
        Ok(())
    }
}

/// Writes spans as newline-delimited JSON
pub struct JsonReporter<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonReporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> SpanReporter for JsonReporter<W> {
    fn report(&self, spans: Vec<Span>) -> Result<(), ReportError> {
        let mut writer = self.writer.lock();
        for span in &spans {
            serde_json::to_writer(&mut *writer, span)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Drops everything; useful when only the generator's own throughput matters
#[derive(Debug, Default)]
pub struct DiscardReporter;

impl SpanReporter for DiscardReporter {
    fn report(&self, _spans: Vec<Span>) -> Result<(), ReportError> {
        Ok(())
    }
}
