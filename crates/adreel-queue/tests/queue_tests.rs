//! Queue integration tests.
//!
//! These require a running Redis instance (REDIS_URL) and are ignored by
//! default.

use adreel_models::JobId;
use adreel_queue::{JobQueue, QueueConfig, RenderAdJob};

fn test_queue(suffix: &str) -> JobQueue {
    let config = QueueConfig {
        stream_name: format!("adreel:test:jobs:{suffix}"),
        consumer_group: format!("adreel:test:workers:{suffix}"),
        dlq_stream_name: format!("adreel:test:dlq:{suffix}"),
        ..QueueConfig::from_env()
    };
    JobQueue::new(config).expect("queue client")
}

#[tokio::test]
#[ignore]
async fn test_enqueue_consume_ack_roundtrip() {
    let queue = test_queue("roundtrip");
    queue.init().await.unwrap();

    let payload = RenderAdJob::new(JobId::new(), 1);
    queue.enqueue(&payload).await.unwrap();

    let jobs = queue.consume("test-consumer", 1000, 5).await.unwrap();
    assert_eq!(jobs.len(), 1);
    let (message_id, job) = &jobs[0];
    assert_eq!(job.job_id, payload.job_id);

    queue.ack(message_id).await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn test_duplicate_enqueue_is_rejected() {
    let queue = test_queue("dedup");
    queue.init().await.unwrap();

    let payload = RenderAdJob::new(JobId::new(), 1);
    queue.enqueue(&payload).await.unwrap();

    let err = queue.enqueue(&payload).await.unwrap_err();
    assert!(err.to_string().contains("Duplicate"));

    // After clearing the dedup key the payload can be enqueued again.
    queue.clear_dedup(&payload).await.unwrap();
    queue.enqueue(&payload).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_dlq_moves_message_out_of_stream() {
    let queue = test_queue("dlq");
    queue.init().await.unwrap();

    let payload = RenderAdJob::new(JobId::new(), 1);
    queue.enqueue(&payload).await.unwrap();

    let jobs = queue.consume("test-consumer", 1000, 5).await.unwrap();
    let (message_id, job) = &jobs[0];

    queue.dlq(message_id, job, "poisoned payload").await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 0);
    assert!(queue.dlq_len().await.unwrap() >= 1);
}
