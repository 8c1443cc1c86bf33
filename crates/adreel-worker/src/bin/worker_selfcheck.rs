//! Worker selfcheck binary.
//!
//! Probes the queue and persistence layer, prints the health snapshot as
//! JSON, and exits non-zero when unhealthy. Wired into container health
//! checks.

use tracing_subscriber::EnvFilter;

use adreel_queue::JobQueue;
use adreel_repository::MemoryJobStore;
use adreel_worker::WorkerHealth;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            eprintln!("selfcheck: failed to create queue client: {e}");
            std::process::exit(1);
        }
    };
    let repo = MemoryJobStore::new();

    let health = WorkerHealth::check(&queue, &repo).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&health).unwrap_or_else(|_| "{}".to_string())
    );

    if !health.healthy {
        std::process::exit(1);
    }
}
