//! Admission control, retry policy and the offline queue.

pub mod offline_queue;
pub mod rate_limit;
pub mod retry;

pub use offline_queue::{OfflineQueue, OfflineQueueConfig, QueueError, QueuedEvent};
pub use rate_limit::{Admission, RATE_WINDOW, RateLimiter};
pub use retry::{DeliveryAttempt, RetryConfig, RetryError, RetryPolicy, RetryStrategy};
