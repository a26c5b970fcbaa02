//! Runtime tunables

use message_bus::queues;

/// Exponential backoff for transient infrastructure errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 2_000,
            max_attempts: 3,
        }
    }
}

/// Worker runtime configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Subtracted from the host's remaining time to form the soft deadline
    pub safety_margin_secs: i64,
    /// A queue set chains at most this many times before it is force-finalized
    pub max_continuations: u32,
    pub checkpoint_ttl_secs: u64,
    /// Queue continuations are re-enqueued to
    pub work_queue: String,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            safety_margin_secs: 30,
            max_continuations: 20,
            checkpoint_ttl_secs: checkpoint_store::DEFAULT_CHECKPOINT_TTL_SECS,
            work_queue: queues::OPTIMIZATION_WORK.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Coordinator polling configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Backoff schedule between polls; the last entry is the cap
    pub poll_backoff_secs: Vec<u64>,
    pub max_poll_attempts: u32,
    /// Reclaim queues stuck Running longer than this many seconds
    pub stuck_after_secs: Option<u64>,
    /// Drop the device rows of non-winning queues once winners are picked
    pub purge_losing_results: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_backoff_secs: vec![30, 60, 120, 300],
            max_poll_attempts: 10,
            stuck_after_secs: None,
            purge_losing_results: false,
        }
    }
}
