//! Durable job queue and progress channel on Redis.
//!
//! Jobs travel through a Redis Stream with a consumer group (at-least-once
//! delivery); progress events fan out over pub/sub. Coordination between
//! workers happens entirely through the queue and the persisted job records,
//! never through shared memory.

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::RenderAdJob;
pub use progress::{NullProgress, ProgressChannel, ProgressEvent, ProgressSink};
pub use queue::{JobQueue, QueueConfig};
