use dashmap::DashMap;
use tracegen_protocol::*;

use crate::reporter::{ReportError, SpanReporter};

/// In-memory trace store, fed as a span reporter
#[derive(Default)]
pub struct TraceStore {
    spans: DashMap<TraceId, Vec<Span>>,
}

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest spans, grouping them by trace
    pub fn ingest(&self, spans: Vec<Span>) -> usize {
        let count = spans.len();

        for span in spans {
            self.spans.entry(span.trace_id).or_default().push(span);
        }

        count
    }

    /// Get a complete trace by ID
    pub fn get_trace(&self, trace_id: TraceId) -> Option<Trace> {
        let spans = self.spans.get(&trace_id)?.value().clone();
        Trace::from_spans(spans)
    }

    /// Every trace that has a root span, oldest first
    pub fn traces(&self) -> Vec<Trace> {
        let mut traces: Vec<Trace> = self
            .spans
            .iter()
            .filter_map(|entry| Trace::from_spans(entry.value().clone()))
            .collect();
        traces.sort_by_key(|trace| trace.start_time);
        traces
    }

    /// Flat copy of every stored span
    pub fn spans(&self) -> Vec<Span> {
        self.spans
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    pub fn span_count(&self) -> usize {
        self.spans.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn trace_count(&self) -> usize {
        self.spans.len()
    }

    pub fn clear(&self) {
        self.spans.clear();
    }
}

impl SpanReporter for TraceStore {
    fn report(&self, spans: Vec<Span>) -> Result<(), ReportError> {
        self.ingest(spans);
        Ok(())
    }
}
