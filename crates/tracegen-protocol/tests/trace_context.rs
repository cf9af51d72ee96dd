use std::time::Duration;
use tracegen_protocol::*;

#[test]
fn traceparent_roundtrip() {
    let context = TraceContext::new_root();
    let header = context.to_traceparent();

    assert_eq!(header.len(), 55);
    assert!(header.starts_with("00-"));
    assert!(header.ends_with("-01"));

    let parsed = TraceContext::from_traceparent(&header).unwrap();
    assert_eq!(parsed.trace_id, context.trace_id);
    assert_eq!(parsed.span_id, context.span_id);
    assert_eq!(parsed.flags, context.flags);
    assert_eq!(parsed.parent_span_id, None);
}

#[test]
fn traceparent_rejects_malformed_headers() {
    let valid_trace = "4bf92f3577b34da6a3ce929d0e0e4736";
    let valid_span = "00f067aa0ba902b7";

    assert!(matches!(
        TraceContext::from_traceparent("garbage"),
        Err(TraceContextError::InvalidFormat)
    ));
    assert!(matches!(
        TraceContext::from_traceparent(&format!("01-{valid_trace}-{valid_span}-01")),
        Err(TraceContextError::UnsupportedVersion)
    ));
    assert!(matches!(
        TraceContext::from_traceparent(&format!("00-{valid_trace}-abc-01")),
        Err(TraceContextError::InvalidLength)
    ));
    assert!(matches!(
        TraceContext::from_traceparent(&format!("00-{valid_trace}-zzf067aa0ba902b7-01")),
        Err(TraceContextError::InvalidHex)
    ));
    assert!(matches!(
        TraceContext::from_traceparent(&format!("00-{valid_trace}-{valid_span}-1")),
        Err(TraceContextError::InvalidLength)
    ));
    assert!(matches!(
        TraceContext::from_traceparent(&format!("00-{}-{valid_span}-01", "0".repeat(32))),
        Err(TraceContextError::InvalidContext)
    ));
}

#[test]
fn flags_survive_the_header() {
    let mut context = TraceContext::new_root();
    context.flags |= flags::DEBUG | flags::FIREHOSE;

    let parsed = TraceContext::from_traceparent(&context.to_traceparent()).unwrap();
    assert!(parsed.is_sampled());
    assert!(parsed.is_debug());
    assert!(parsed.is_firehose());
}

#[test]
fn text_map_roundtrip() {
    let context = TraceContext::new_root();
    let mut carrier = TextMap::new();
    context.inject(&mut carrier).unwrap();

    assert_eq!(carrier.get(TRACEPARENT_HEADER), Some(&context.to_traceparent()));

    let extracted = TraceContext::extract(&carrier).unwrap();
    let child = extracted.child();
    assert_eq!(child.trace_id, context.trace_id);
    assert_eq!(child.parent_span_id, Some(context.span_id));
}

#[test]
fn extract_is_case_insensitive() {
    let context = TraceContext::new_root();
    let mut carrier = TextMap::new();
    carrier.insert("TraceParent".to_string(), context.to_traceparent());

    let extracted = TraceContext::extract(&carrier).unwrap();
    assert_eq!(extracted.span_id, context.span_id);
}

#[test]
fn extract_without_header_fails() {
    let mut carrier = TextMap::new();
    carrier.insert("x-request-id".to_string(), "abc".to_string());

    assert!(matches!(
        TraceContext::extract(&carrier),
        Err(TraceContextError::MissingHeader)
    ));
}

#[test]
fn inject_rejects_zero_ids() {
    let context = TraceContext {
        trace_id: TraceId([0; 16]),
        span_id: SpanId::new(),
        parent_span_id: None,
        flags: flags::SAMPLED,
    };
    let mut carrier = TextMap::new();

    assert!(matches!(
        context.inject(&mut carrier),
        Err(TraceContextError::InvalidContext)
    ));
    assert!(carrier.is_empty());
}

#[test]
fn ids_serialize_as_hex_strings() {
    let trace_id = TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap();
    let json = serde_json::to_string(&trace_id).unwrap();
    assert_eq!(json, "\"4bf92f3577b34da6a3ce929d0e0e4736\"");

    let back: TraceId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, trace_id);

    assert!(serde_json::from_str::<SpanId>("\"not-hex\"").is_err());
}

#[test]
fn timestamps_add_durations() {
    let start = Timestamp(1_000);
    let end = start + Duration::from_micros(3);
    assert_eq!(end, Timestamp(4_000));
    assert_eq!(end.nanos_since(start), 3_000);
    assert_eq!(start.nanos_since(end), 0);
    assert_eq!(Timestamp(0).to_rfc3339(), "1970-01-01T00:00:00Z");
}
