//! Command channel abstraction for the order fulfillment system.
//!
//! Three logical topics connect the saga orchestrator to the inventory
//! reservation engine: reserve commands, release commands, and results.
//! Delivery is at-least-once with per-key ordering within a topic and no
//! ordering guarantee across topics; each topic is drained by at most one
//! consumer group.

pub mod bus;
pub mod error;
pub mod messages;
pub mod publisher;
pub mod topic;

pub use bus::{Envelope, InMemoryBus, MessageBus};
pub use error::ChannelError;
pub use messages::{InventoryResult, ReleaseCommand, ReserveCommand};
pub use publisher::publish_with_retry;
pub use topic::Topic;

/// Convenience type alias for channel results.
pub type Result<T> = std::result::Result<T, ChannelError>;
