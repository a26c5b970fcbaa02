//! Messaging adapter
//!
//! Abstract message bus carrying the optimization work contract in string
//! attributes: at-least-once delivery, visibility timeouts, and dead-letter
//! semantics. The in-memory implementation backs tests and local runs; a
//! production deployment plugs a real broker behind the same trait.

pub mod attrs;
pub mod bus;
pub mod error;
pub mod memory;
pub mod message;

pub use attrs::{GenerationPayload, WorkOrder};
pub use bus::{queues, MessageBus};
pub use error::BusError;
pub use memory::InMemoryMessageBus;
pub use message::WorkMessage;
