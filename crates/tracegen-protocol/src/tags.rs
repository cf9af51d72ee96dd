//! Semantic tag keys, following the OpenTracing conventions backends index on.

pub const SPAN_KIND: &str = "span.kind";
pub const PEER_SERVICE: &str = "peer.service";
pub const PEER_HOST_IPV4: &str = "peer.ipv4";
pub const SAMPLING_PRIORITY: &str = "sampling.priority";
pub const ERROR: &str = "error";

pub const HTTP_METHOD: &str = "http.method";
pub const HTTP_URL: &str = "http.url";
pub const HTTP_STATUS_CODE: &str = "http.status_code";

pub const DB_TYPE: &str = "db.type";
pub const DB_INSTANCE: &str = "db.instance";
pub const DB_STATEMENT: &str = "db.statement";

/// Event name and fields used by error logs
pub const EVENT_ERROR: &str = "error";
pub const ERROR_OBJECT: &str = "error.object";
