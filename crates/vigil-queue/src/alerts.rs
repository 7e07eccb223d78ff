//! Alert events over Redis Pub/Sub.

use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use vigil_models::{AlertEvent, AlertSink};

use crate::error::QueueResult;

/// Pub/Sub channel receiving serialized [`AlertEvent`]s.
pub const ALERT_CHANNEL: &str = "vigil:alerts";

/// Publishes alerts to Redis from a background task.
///
/// `alert()` only pushes onto an unbounded channel, so callers never wait on
/// Redis. Events that cannot be published are logged and dropped.
pub struct RedisAlertChannel {
    tx: mpsc::UnboundedSender<AlertEvent>,
}

impl RedisAlertChannel {
    /// Open the client and spawn the publisher. Must run inside a Tokio runtime.
    pub fn spawn(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(publish_loop(client, rx));
        Ok(Self { tx })
    }
}

async fn publish_loop(client: redis::Client, mut rx: mpsc::UnboundedReceiver<AlertEvent>) {
    let mut conn: Option<redis::aio::MultiplexedConnection> = None;

    while let Some(event) = rx.recv().await {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize alert");
                continue;
            }
        };

        if conn.is_none() {
            match client.get_multiplexed_async_connection().await {
                Ok(c) => conn = Some(c),
                Err(e) => {
                    warn!(kind = event.kind.as_str(), error = %e, "Alert dropped, Redis unreachable");
                    continue;
                }
            }
        }
        let Some(c) = conn.as_mut() else { continue };

        match c.publish::<_, _, ()>(ALERT_CHANNEL, payload).await {
            Ok(()) => debug!(kind = event.kind.as_str(), "Published alert"),
            Err(e) => {
                warn!(kind = event.kind.as_str(), error = %e, "Alert publish failed");
                // Reconnect on the next event
                conn = None;
            }
        }
    }
    debug!("Alert channel closed");
}

impl AlertSink for RedisAlertChannel {
    fn alert(&self, event: AlertEvent) {
        if self.tx.send(event).is_err() {
            warn!("Alert publisher stopped, dropping alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_models::{AlertKind, MediaId};

    #[tokio::test]
    async fn test_alert_never_blocks_without_redis() {
        // Nothing listens on port 1; publishing fails in the background only
        let channel = RedisAlertChannel::spawn("redis://127.0.0.1:1").unwrap();
        for _ in 0..100 {
            channel.alert(AlertEvent::for_media(
                AlertKind::PollTimeout,
                MediaId::from_string("m-1"),
                "timeout",
            ));
        }
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(RedisAlertChannel::spawn("not a url").is_err());
    }
}
