use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracegen::*;

/// Factory that counts initializations and can be told to fail the first `failures` calls
struct CountingFactory {
    calls: Arc<AtomicUsize>,
    failures: usize,
}

impl TracerFactory for CountingFactory {
    fn create(&self, service_name: &str) -> Result<Tracer, TracerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which other callers can pile up
        std::thread::sleep(std::time::Duration::from_millis(20));
        if call < self.failures {
            return Err(TracerError::EmptyServiceName);
        }
        Tracer::new(TracerConfig::new(service_name), Arc::new(DiscardReporter))
    }
}

fn counting_registry(failures: usize) -> (TracerRegistry, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = TracerRegistry::new(CountingFactory {
        calls: calls.clone(),
        failures,
    });
    (registry, calls)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_first_access_initializes_once() {
    let (registry, calls) = counting_registry(0);

    let mut handles = Vec::new();
    for _ in 0..32 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move { registry.get("frontend").await }));
    }

    let mut tracers = Vec::new();
    for handle in handles {
        tracers.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(tracers.iter().all(|t| Tracer::ptr_eq(t, &tracers[0])));
    assert_eq!(tracers[0].service_name(), "frontend");
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn cached_tracers_are_returned_without_reinitializing() {
    let (registry, calls) = counting_registry(0);

    let first = registry.get("backend").await.unwrap();
    let second = registry.get("backend").await.unwrap();

    assert!(Tracer::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_services_get_distinct_tracers() {
    let (registry, calls) = counting_registry(0);

    let a = registry.get("svc-a").await.unwrap();
    let b = registry.get("svc-b").await.unwrap();

    assert!(!Tracer::ptr_eq(&a, &b));
    assert_eq!(a.service_name(), "svc-a");
    assert_eq!(b.service_name(), "svc-b");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(registry.tracers().len(), 2);
}

#[tokio::test]
async fn failed_initialization_is_retried() {
    let (registry, calls) = counting_registry(1);

    let err = registry.get("flaky").await.unwrap_err();
    assert_eq!(err.service, "flaky");
    assert!(matches!(err.source, TracerError::EmptyServiceName));
    assert!(registry.is_empty());

    let tracer = registry.get("flaky").await.unwrap();
    assert_eq!(tracer.service_name(), "flaky");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn closures_work_as_factories() {
    let registry = TracerRegistry::new(|service: &str| {
        Tracer::new(TracerConfig::new(format!("{service}-v2")), Arc::new(DiscardReporter))
    });

    let tracer = registry.get("billing").await.unwrap();
    assert_eq!(tracer.service_name(), "billing-v2");
}

#[tokio::test]
async fn default_factory_samples_everything_and_counts() {
    let store = Arc::new(TraceStore::new());
    let registry = TracerRegistry::with_reporter(store.clone());

    let tracer = registry.get("orders").await.unwrap();
    tracer.span("op").start().finish();
    registry.flush_all().await;

    assert_eq!(store.span_count(), 1);
    assert_eq!(tracer.metrics().spans_finished, 1);
}
