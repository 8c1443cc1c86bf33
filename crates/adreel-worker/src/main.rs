//! Ad generation worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use adreel_generate::HttpGenerator;
use adreel_queue::{JobQueue, ProgressChannel};
use adreel_repository::MemoryJobStore;
use adreel_storage::{ObjectCacheConfig, RemoteObjectCache, S3Store};
use adreel_worker::{FfmpegComposer, JobExecutor, ProcessingContext, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("adreel=info".parse().unwrap())
        .add_directive("aws_config=warn".parse().unwrap())
        .add_directive("hyper=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting adreel-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let progress = match ProgressChannel::new(&redis_url) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to create progress channel: {}", e);
            std::process::exit(1);
        }
    };

    let store = match S3Store::from_env() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create object store: {}", e);
            std::process::exit(1);
        }
    };

    let generator = match HttpGenerator::from_env() {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create generation client: {}", e);
            std::process::exit(1);
        }
    };

    let cache = RemoteObjectCache::new(store.clone(), ObjectCacheConfig::from_env());

    let ctx = ProcessingContext {
        config,
        repo: Arc::new(MemoryJobStore::new()),
        store,
        cache: Arc::new(cache),
        generator: Arc::new(generator),
        composer: Arc::new(FfmpegComposer),
        progress: Arc::new(progress),
    };

    let executor = Arc::new(JobExecutor::new(ctx, queue));

    // Finish or cleanly fail the in-flight stage before exiting.
    let shutdown_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
