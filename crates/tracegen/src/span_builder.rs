use std::collections::BTreeMap;
use tracegen_protocol::tags;
use tracegen_protocol::*;

use crate::tracer::Tracer;

/// Builder for creating and starting spans
pub struct SpanBuilder {
    name: String,
    tracer: Tracer,
    attributes: BTreeMap<String, AttributeValue>,
    references: Vec<(ReferenceKind, TraceContext)>,
    start_time: Option<Timestamp>,
}

impl SpanBuilder {
    pub(crate) fn new(name: String, tracer: Tracer) -> Self {
        Self {
            name,
            tracer,
            attributes: BTreeMap::new(),
            references: Vec::new(),
            start_time: None,
        }
    }

    /// Start the span as a child of `parent`
    pub fn child_of(mut self, parent: &TraceContext) -> Self {
        self.references.push((ReferenceKind::ChildOf, parent.clone()));
        self
    }

    /// Start the span as a causal, non-blocking successor of `parent`
    pub fn follows_from(mut self, parent: &TraceContext) -> Self {
        self.references.push((ReferenceKind::FollowsFrom, parent.clone()));
        self
    }

    /// Server side of an RPC whose client side is `parent`
    pub fn server_of(self, parent: &TraceContext) -> Self {
        self.child_of(parent).with_kind(SpanKind::Server)
    }

    pub fn with_kind(self, kind: SpanKind) -> Self {
        self.with_attribute(tags::SPAN_KIND, kind.as_str())
    }

    /// Add an attribute to the span
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl IntoAttributeValue,
    ) -> Self {
        self.attributes.insert(key.into(), value.into_attribute_value());
        self
    }

    /// Override the start instant (defaults to now)
    pub fn with_start_time(mut self, start_time: Timestamp) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Start the span
    pub fn start(self) -> ActiveSpan {
        // A child-of reference wins over follows-from when picking the parent
        let parent = self
            .references
            .iter()
            .find(|(kind, _)| *kind == ReferenceKind::ChildOf)
            .or_else(|| self.references.first())
            .map(|(_, context)| context);

        let context = match parent {
            Some(parent) => parent.child(),
            None => {
                let mut context = TraceContext::new_root();
                if !self.tracer.sample_root() {
                    context.flags &= !flags::SAMPLED;
                }
                context
            }
        };

        let references = self
            .references
            .iter()
            .map(|(kind, context)| SpanReference {
                kind: *kind,
                trace_id: context.trace_id,
                span_id: context.span_id,
            })
            .collect();

        let span = Span {
            trace_id: context.trace_id,
            span_id: context.span_id,
            parent_span_id: context.parent_span_id,
            references,
            name: self.name,
            start_time: self.start_time.unwrap_or_else(Timestamp::now),
            end_time: None,
            attributes: self.attributes,
            events: Vec::new(),
            status: SpanStatus::Ok,
            service_name: self.tracer.service_name().to_string(),
            flags: context.flags,
        };

        self.tracer.record_started();

        ActiveSpan {
            span,
            context,
            tracer: self.tracer,
        }
    }
}

/// Active span (not yet finished)
pub struct ActiveSpan {
    span: Span,
    context: TraceContext,
    tracer: Tracer,
}

impl ActiveSpan {
    /// Get the trace context (for propagation to downstream calls)
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn start_time(&self) -> Timestamp {
        self.span.start_time
    }

    /// Add or replace an attribute on the running span
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl IntoAttributeValue) {
        self.span
            .attributes
            .insert(key.into(), value.into_attribute_value());
    }

    /// Mark the span as errored
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.span.status = SpanStatus::Error {
            message: message.into(),
        };
    }

    /// Mark the span as errored and record an `error` log entry carrying `fields`
    pub fn log_error<K, V>(
        &mut self,
        message: impl Into<String>,
        fields: impl IntoIterator<Item = (K, V)>,
    ) where
        K: Into<String>,
        V: IntoAttributeValue,
    {
        let message = message.into();

        let mut attributes: BTreeMap<String, AttributeValue> = fields
            .into_iter()
            .map(|(key, value)| (key.into(), value.into_attribute_value()))
            .collect();
        attributes.insert(
            tags::ERROR_OBJECT.to_string(),
            AttributeValue::String(message.clone()),
        );

        self.span.events.push(SpanEvent {
            name: tags::EVENT_ERROR.to_string(),
            timestamp: Timestamp::now(),
            attributes,
        });
        self.set_attribute(tags::ERROR, true);
        self.set_error(message);
    }

    /// A non-zero priority forces the trace to be sampled and flags it as debug;
    /// zero drops it.
    pub fn set_sampling_priority(&mut self, priority: u16) {
        self.set_attribute(tags::SAMPLING_PRIORITY, priority);
        if priority > 0 {
            self.context.flags |= flags::SAMPLED | flags::DEBUG;
        } else {
            self.context.flags &= !flags::SAMPLED;
        }
        self.span.flags = self.context.flags;
    }

    /// Ask the backend to skip indexing for this span and its descendants
    pub fn enable_firehose(&mut self) {
        self.context.flags |= flags::FIREHOSE;
        self.span.flags = self.context.flags;
    }

    /// End the span now and hand it to the reporter
    pub fn finish(self) {
        self.finish_at(Timestamp::now());
    }

    /// End the span at an explicit instant and hand it to the reporter
    pub fn finish_at(mut self, end_time: Timestamp) {
        self.span.end_time = Some(end_time);
        self.tracer.record_finished(self.span);
    }
}

// Helper trait for converting to AttributeValue
pub trait IntoAttributeValue {
    fn into_attribute_value(self) -> AttributeValue;
}

impl IntoAttributeValue for &str {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::String(self.to_string())
    }
}

impl IntoAttributeValue for String {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::String(self)
    }
}

impl IntoAttributeValue for i64 {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::Int(self)
    }
}

impl IntoAttributeValue for i32 {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::Int(self as i64)
    }
}

impl IntoAttributeValue for u16 {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::Int(self as i64)
    }
}

impl IntoAttributeValue for u32 {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::Int(self as i64)
    }
}

impl IntoAttributeValue for bool {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::Bool(self)
    }
}

impl IntoAttributeValue for f64 {
    fn into_attribute_value(self) -> AttributeValue {
        AttributeValue::Float(self)
    }
}

impl IntoAttributeValue for AttributeValue {
    fn into_attribute_value(self) -> AttributeValue {
        self
    }
}
