//! Bounded-retry publishing.

use std::time::Duration;

use crate::bus::{Envelope, MessageBus};
use crate::error::ChannelError;
use crate::topic::Topic;

/// Maximum publish attempts before a message is declared undeliverable.
const MAX_ATTEMPTS: u32 = 3;

/// Base delay between attempts; the wait grows linearly per attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Publishes an envelope, retrying with increasing backoff.
///
/// Retries up to 3 times, sleeping `500ms × attempt` between attempts.
/// Returns [`ChannelError::Undeliverable`] once retries are exhausted;
/// the caller decides whether that is fatal (a dropped result is the
/// biggest consistency risk in the system, so engine callers log it at
/// error level).
pub async fn publish_with_retry<B: MessageBus + ?Sized>(
    bus: &B,
    topic: Topic,
    envelope: Envelope,
) -> Result<(), ChannelError> {
    for attempt in 1..=MAX_ATTEMPTS {
        match bus.publish(topic, envelope.clone()).await {
            Ok(()) => {
                if attempt > 1 {
                    tracing::info!(%topic, key = %envelope.key, attempt, "publish succeeded after retry");
                }
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(%topic, key = %envelope.key, attempt, error = %e, "publish attempt failed");
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
            }
        }
    }

    Err(ChannelError::Undeliverable {
        topic,
        attempts: MAX_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;

    #[tokio::test]
    async fn first_attempt_succeeds() {
        let bus = InMemoryBus::new();
        let mut rx = bus.subscribe(Topic::Results).unwrap();

        publish_with_retry(&bus, Topic::Results, Envelope::new("1-1", b"ok".to_vec()))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().payload, b"ok".to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_on_closed_topic() {
        let bus = InMemoryBus::new();
        drop(bus.subscribe(Topic::Results).unwrap());

        let err = publish_with_retry(&bus, Topic::Results, Envelope::new("1-1", vec![]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ChannelError::Undeliverable {
                topic: Topic::Results,
                attempts: 3,
            }
        ));
    }
}
