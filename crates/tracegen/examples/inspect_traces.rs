use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracegen::{run, RunConfig, TraceStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🏭 Generating a handful of traces in memory...");

    let store = Arc::new(TraceStore::new());
    let config = RunConfig {
        workers: 2,
        traces: 3,
        marshal: true,
        chains: vec![
            "frontend,redis-sessions,checkout,mysql-orders".parse()?,
            "frontend,search".parse()?,
        ],
        ..RunConfig::default()
    };

    let summary = run(config, store.clone(), CancellationToken::new()).await?;

    println!("\n📊 Generated {} trace(s):", summary.total_traces());
    for trace in store.traces() {
        println!("  - Trace ID: {}", trace.trace_id);
        println!("    Services: {:?}", trace.services());
        println!("    Spans: {}", trace.spans.len());
        println!("    Errors: {}", trace.has_errors());
        if let Some(duration) = trace.duration_nanos() {
            println!("    Duration: {}ms", duration / 1_000_000);
        }
        println!();
    }

    Ok(())
}
