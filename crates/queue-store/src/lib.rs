//! Optimization queue store
//!
//! Persistent queue, session, and result tables with the status state
//! machine. Every transition is a conditional compare-and-set update; the
//! CAS is the at-most-once gate the whole runtime leans on. Postgres backs
//! production; an in-memory implementation backs unit tests.

pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod repository;
pub mod schema;

pub use error::QueueStoreError;
pub use memory::InMemoryQueueRepository;
pub use models::*;
pub use pg::PgQueueRepository;
pub use repository::QueueRepository;
