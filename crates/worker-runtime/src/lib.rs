//! Chained-execution worker runtime
//!
//! Consumes optimization work messages, routes fresh runs and continuations,
//! enforces the in-worker soft deadline, persists checkpoints and re-enqueues
//! continuations on timeout, and finalizes queue results with at-most-once
//! recording. The coordinator watches a session's queues converge and emits
//! the terminal cleanup event.

pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod loader;
pub mod progress;
pub mod recorder;
pub mod retry;
pub mod worker;

pub use config::{CoordinatorConfig, RetryPolicy, WorkerConfig};
pub use context::WorkerContext;
pub use coordinator::{CoordinationOutcome, Coordinator};
pub use error::WorkerError;
pub use loader::{InMemoryWorkloadLoader, LoaderError, WorkloadLoader};
pub use progress::{LogProgressSink, NoopProgressSink, ProgressEvent, ProgressSink};
pub use recorder::ResultRecorder;
pub use worker::{Disposition, WorkerRuntime};
