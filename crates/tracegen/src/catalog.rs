//! Fake data used to dress up generated spans: peer addresses, latencies, and the
//! operation vocabularies of the simulated services.

use rand::Rng;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Operations served by ordinary RPC hops when none are configured
pub const DEFAULT_SERVICE_APIS: &[&str] = &[
    "GET:/api/v1/users",
    "GET:/api/v1/users/profile",
    "POST:/api/v1/orders",
    "GET:/api/v1/orders/history",
    "PUT:/api/v1/cart",
    "DELETE:/api/v1/cart/items",
    "GET:/api/v1/inventory",
    "POST:/api/v1/payments",
];

const WORDS: &[&str] = &[
    "alias", "amet", "aperiam", "beatae", "blanditiis", "commodi", "consequatur", "corporis",
    "culpa", "debitis", "delectus", "dolor", "dolores", "enim", "eos", "error", "esse", "eum",
    "facilis", "fugit", "harum", "illum", "impedit", "ipsa", "ipsum", "iusto", "labore",
    "laborum", "magnam", "maxime", "minus", "modi", "molestiae", "nemo", "nihil", "nobis",
    "odio", "omnis", "optio", "pariatur", "placeat", "quaerat", "quia", "quibusdam", "quod",
    "ratione", "rem", "repellat", "saepe", "sequi", "sint", "sit", "soluta", "tempora",
    "tenetur", "totam", "ullam", "velit", "veniam", "vitae", "voluptas",
];

/// A random dotted-quad address
pub fn random_ipv4() -> Ipv4Addr {
    Ipv4Addr::from(rand::thread_rng().gen::<[u8; 4]>())
}

/// A random address packed big-endian into a `u32`, the way `peer.ipv4` is tagged
pub fn random_peer_address() -> u32 {
    u32::from(random_ipv4())
}

/// Synthetic latency of a single hop, somewhere in [0, 108] ms
pub fn random_span_duration() -> Duration {
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(0..10) + rng.gen_range(0..100))
}

/// Jitter for a hop of the given duration: always below `span_duration + 3ms`
pub fn pause_duration(span_duration: Duration) -> Duration {
    let upper = 3 + span_duration.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..upper))
}

/// Picks a jitter pause for `span_duration` and sleeps for it before returning it.
///
/// This is the only place the generator waits on the wall clock, which keeps the
/// trace production rate in the same ballpark as a real system.
pub async fn random_pause_duration(span_duration: Duration) -> Duration {
    let pause = pause_duration(span_duration);
    if !pause.is_zero() {
        tokio::time::sleep(pause).await;
    }
    pause
}

/// `n` filler words, used as the payload of injected error logs
pub fn random_words(n: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a `METHOD:/path` operation name into its HTTP method and path
pub fn split_api(operation: &str) -> (&str, &str) {
    operation.split_once(':').unwrap_or((operation, ""))
}

/// Simulated data-store backends, selected by a `<name>-` prefix on a service name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendFlavor {
    Redis,
    Mysql,
}

// Indexed by discriminant: keep in declaration order.
static FLAVORS: [(BackendFlavor, &str, &[&str]); 2] = [
    (BackendFlavor::Redis, "redis", &["Incr", "Set", "HSet", "TTL"]),
    (BackendFlavor::Mysql, "mysql", &["Query", "Update", "Delete", "Update", "Replace"]),
];

impl BackendFlavor {
    pub const ALL: [BackendFlavor; 2] = [BackendFlavor::Redis, BackendFlavor::Mysql];

    fn entry(self) -> &'static (BackendFlavor, &'static str, &'static [&'static str]) {
        &FLAVORS[self as usize]
    }

    /// Canonical service name, also reported as `db.type`
    pub fn name(self) -> &'static str {
        self.entry().1
    }

    pub fn operations(self) -> &'static [&'static str] {
        self.entry().2
    }

    /// Detect a flavor prefix, returning the flavor and whatever follows the prefix
    ///
    /// `"redis-cache"` parses as `(Redis, "cache")`; `"redis"` alone is an ordinary service.
    pub fn parse(service: &str) -> Option<(BackendFlavor, &str)> {
        FLAVORS.iter().find_map(|(flavor, name, _)| {
            service
                .strip_prefix(name)?
                .strip_prefix('-')
                .map(|rest| (*flavor, rest))
        })
    }

    pub fn pick_operation<R: Rng + ?Sized>(self, rng: &mut R) -> &'static str {
        let operations = self.operations();
        operations[rng.gen_range(0..operations.len())]
    }
}

/// Pool of generic operations for ordinary RPC hops
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceApis {
    apis: Vec<String>,
}

impl ServiceApis {
    pub fn new<I, S>(apis: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let apis: Vec<String> = apis.into_iter().map(Into::into).collect();
        if apis.is_empty() {
            return Err(CatalogError::EmptyApis);
        }
        if let Some(bad) = apis.iter().find(|api| !api.contains(':')) {
            return Err(CatalogError::MalformedApi(bad.clone()));
        }
        Ok(Self { apis })
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.apis[rng.gen_range(0..self.apis.len())]
    }

    pub fn contains(&self, api: &str) -> bool {
        self.apis.iter().any(|a| a == api)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.apis.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.apis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }
}

impl Default for ServiceApis {
    fn default() -> Self {
        Self {
            apis: DEFAULT_SERVICE_APIS.iter().map(|api| api.to_string()).collect(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("at least one service API is required")]
    EmptyApis,

    #[error("service API {0:?} is not of the form METHOD:/path")]
    MalformedApi(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_table_matches_discriminants() {
        for flavor in BackendFlavor::ALL {
            assert_eq!(flavor.entry().0, flavor);
        }
    }

    #[test]
    fn parse_requires_dash_after_prefix() {
        assert_eq!(BackendFlavor::parse("redis-cache"), Some((BackendFlavor::Redis, "cache")));
        assert_eq!(BackendFlavor::parse("mysql-orders"), Some((BackendFlavor::Mysql, "orders")));
        assert_eq!(BackendFlavor::parse("redis"), None);
        assert_eq!(BackendFlavor::parse("rediscache"), None);
        assert_eq!(BackendFlavor::parse("frontend"), None);
    }

    #[test]
    fn service_apis_reject_empty_and_malformed_pools() {
        assert!(matches!(
            ServiceApis::new(Vec::<String>::new()),
            Err(CatalogError::EmptyApis)
        ));
        assert!(matches!(
            ServiceApis::new(["GET:/ok", "health"]),
            Err(CatalogError::MalformedApi(api)) if api == "health"
        ));
        assert_eq!(ServiceApis::new(["GET:/ok"]).unwrap().len(), 1);
    }

    #[test]
    fn split_api_without_colon_keeps_method() {
        assert_eq!(split_api("GET:/a:b"), ("GET", "/a:b"));
        assert_eq!(split_api("PING"), ("PING", ""));
    }

    #[test]
    fn pause_is_bounded_by_span_duration() {
        for _ in 0..1_000 {
            let span = random_span_duration();
            assert!(pause_duration(span) < span + Duration::from_millis(3));
        }
    }
}
