//! Worker health probes.
//!
//! Supervising infrastructure polls this to detect a stuck worker: the
//! queue and the persistence layer must both be reachable for the worker to
//! count as healthy.

use serde::Serialize;

use adreel_queue::JobQueue;
use adreel_repository::JobStore;

/// Health snapshot of the worker's dependencies.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealth {
    /// Queue reachable (probe via stream length)
    pub queue_ok: bool,
    /// Persistence layer reachable
    pub repository_ok: bool,
    /// Overall flag: all dependencies reachable
    pub healthy: bool,
}

impl WorkerHealth {
    /// Probe the queue and repository.
    pub async fn check(queue: &JobQueue, repo: &dyn JobStore) -> Self {
        let queue_ok = queue.len().await.is_ok();
        let repository_ok = repo.ping().await.is_ok();

        Self {
            queue_ok,
            repository_ok,
            healthy: queue_ok && repository_ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_repository::MemoryJobStore;

    #[tokio::test]
    async fn test_unreachable_queue_is_unhealthy() {
        // Nothing listens on this port; the probe must fail fast, not hang.
        let queue = JobQueue::new(adreel_queue::QueueConfig {
            redis_url: "redis://127.0.0.1:1".to_string(),
            ..Default::default()
        })
        .unwrap();
        let repo = MemoryJobStore::new();

        let health = WorkerHealth::check(&queue, &repo).await;
        assert!(!health.queue_ok);
        assert!(health.repository_ok);
        assert!(!health.healthy);
    }
}
