//! Channel error types.

use thiserror::Error;

use crate::topic::Topic;

/// Errors that can occur on the command channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The topic already has a consumer; each topic is drained by at most
    /// one consumer group.
    #[error("topic {0} already has a consumer")]
    AlreadySubscribed(Topic),

    /// The topic's consumer side is gone and the publish cannot be accepted.
    #[error("topic {0} is closed")]
    TopicClosed(Topic),

    /// Publishing failed after exhausting the bounded retries.
    #[error("message to topic {topic} undeliverable after {attempts} attempts")]
    Undeliverable { topic: Topic, attempts: u32 },

    /// Message body could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
