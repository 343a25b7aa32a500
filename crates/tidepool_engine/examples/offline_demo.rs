//! Walkthrough of the offline engine: queue while disconnected, replay on
//! reconnect, read-through cache with TTL.
//!
//! Run with: `cargo run --example offline_demo`

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tidepool_engine::{ActionKind, EngineConfig, MockRemote, OfflineEngine};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tidepool_engine=debug,tidepool_store=debug".into()),
        )
        .init();

    let dir = tempfile::TempDir::new()?;
    let remote = Arc::new(MockRemote::new());
    let engine = Arc::new(OfflineEngine::open(
        EngineConfig::new(dir.path().join("tidepool.log")).with_initially_online(false),
        Arc::clone(&remote) as _,
    )?);

    println!("durable store: {}", engine.is_durable());

    // Work offline: mutations queue up locally.
    engine.enqueue_action(
        ActionKind::Insert,
        "bookings",
        json!({ "id": "b1", "name": "Alice", "service": "consult" }),
    )?;
    engine.enqueue_action(
        ActionKind::Update,
        "bookings",
        json!({ "id": "b1", "time": "10:00" }),
    )?;
    println!("offline status: {:?}", engine.status());

    // Cache an expensive lookup.
    engine.cache_set("quote:consult", json!({ "price": 500 }), Duration::from_secs(60));
    println!(
        "cached quote: {:?}",
        engine.cache_get::<Value>("quote:consult")
    );

    // Connectivity returns: the queue drains in order.
    engine.set_online(true);
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("online status: {:?}", engine.status());
    for dispatch in remote.dispatches() {
        println!("replayed: {} {} {}", dispatch.op, dispatch.target, dispatch.payload);
    }

    engine.close()?;
    Ok(())
}
