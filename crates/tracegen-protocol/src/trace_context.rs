use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Text-map header carrying the W3C traceparent
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Flat string-keyed carrier used to propagate a context across a process boundary
pub type TextMap = BTreeMap<String, String>;

/// 16-byte trace ID (128 bits)
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct TraceId(pub [u8; 16]);

impl TraceId {
    /// Generate a new random trace ID
    pub fn new() -> Self {
        let mut bytes = [0u8; 16];
        getrandom::getrandom(&mut bytes).expect("failed to generate random trace ID");
        Self(bytes)
    }

    /// Parse from hex string (W3C format: 32 hex chars)
    pub fn from_hex(s: &str) -> Result<Self, TraceContextError> {
        if s.len() != 32 {
            return Err(TraceContextError::InvalidLength);
        }
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| TraceContextError::InvalidHex)?;
        Ok(Self(bytes))
    }

    /// Format as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The all-zero ID is reserved by W3C as "invalid"
    pub fn is_valid(&self) -> bool {
        self.0 != [0u8; 16]
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self.to_hex())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TraceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// 8-byte span ID (64 bits)
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct SpanId(pub [u8; 8]);

impl SpanId {
    /// Generate a new random span ID
    pub fn new() -> Self {
        let mut bytes = [0u8; 8];
        getrandom::getrandom(&mut bytes).expect("failed to generate random span ID");
        Self(bytes)
    }

    /// Parse from hex string (W3C format: 16 hex chars)
    pub fn from_hex(s: &str) -> Result<Self, TraceContextError> {
        if s.len() != 16 {
            return Err(TraceContextError::InvalidLength);
        }
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| TraceContextError::InvalidHex)?;
        Ok(Self(bytes))
    }

    /// Format as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_valid(&self) -> bool {
        self.0 != [0u8; 8]
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self.to_hex())
    }
}

impl Default for SpanId {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SpanId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Trace flag bits (same layout Jaeger uses)
pub mod flags {
    pub const SAMPLED: u8 = 0x01;
    pub const DEBUG: u8 = 0x02;
    pub const FIREHOSE: u8 = 0x08;
}

/// W3C traceparent header: "00-{trace_id}-{span_id}-{flags}"
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub flags: u8,
}

impl TraceContext {
    /// Create a new root trace context
    pub fn new_root() -> Self {
        Self {
            trace_id: TraceId::new(),
            span_id: SpanId::new(),
            parent_span_id: None,
            flags: flags::SAMPLED,
        }
    }

    /// Create a child span in the same trace
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::new(),
            parent_span_id: Some(self.span_id),
            flags: self.flags,
        }
    }

    pub fn is_sampled(&self) -> bool {
        self.flags & flags::SAMPLED != 0
    }

    pub fn is_debug(&self) -> bool {
        self.flags & flags::DEBUG != 0
    }

    pub fn is_firehose(&self) -> bool {
        self.flags & flags::FIREHOSE != 0
    }

    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }

    /// Parse from W3C traceparent header
    pub fn from_traceparent(header: &str) -> Result<Self, TraceContextError> {
        let parts: Vec<&str> = header.trim().split('-').collect();
        if parts.len() != 4 {
            return Err(TraceContextError::InvalidFormat);
        }

        if parts[0] != "00" {
            return Err(TraceContextError::UnsupportedVersion);
        }

        let trace_id = TraceId::from_hex(parts[1])?;
        let span_id = SpanId::from_hex(parts[2])?;
        if parts[3].len() != 2 {
            return Err(TraceContextError::InvalidLength);
        }
        let flags = u8::from_str_radix(parts[3], 16).map_err(|_| TraceContextError::InvalidHex)?;

        let context = Self {
            trace_id,
            span_id,
            parent_span_id: None,
            flags,
        };
        if !context.is_valid() {
            return Err(TraceContextError::InvalidContext);
        }

        Ok(context)
    }

    /// Format as W3C traceparent header
    pub fn to_traceparent(&self) -> String {
        format!(
            "00-{}-{}-{:02x}",
            self.trace_id.to_hex(),
            self.span_id.to_hex(),
            self.flags
        )
    }

    /// Write this context into a text-map carrier
    pub fn inject(&self, carrier: &mut TextMap) -> Result<(), TraceContextError> {
        if !self.is_valid() {
            return Err(TraceContextError::InvalidContext);
        }
        carrier.insert(TRACEPARENT_HEADER.to_string(), self.to_traceparent());
        Ok(())
    }

    /// Read a context back out of a text-map carrier.
    ///
    /// Header lookup is case-insensitive, the way HTTP header maps behave.
    pub fn extract(carrier: &TextMap) -> Result<Self, TraceContextError> {
        let header = carrier
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(TRACEPARENT_HEADER))
            .map(|(_, value)| value)
            .ok_or(TraceContextError::MissingHeader)?;

        Self::from_traceparent(header)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceContextError {
    #[error("invalid traceparent format")]
    InvalidFormat,
    #[error("unsupported trace context version")]
    UnsupportedVersion,
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("invalid length")]
    InvalidLength,
    #[error("trace and span IDs must not be all zeroes")]
    InvalidContext,
    #[error("carrier has no traceparent header")]
    MissingHeader,
}
