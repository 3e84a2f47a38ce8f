//! Seams to the worker's control and payload channels.
//!
//! Framing, pipes and request correlation belong to the channel
//! implementation. A consumer only needs to issue requests and to receive
//! the notifications routed to its id.

use crate::errors::ChannelError;
use crate::observability::metrics;

use async_trait::async_trait;
use bytes::Bytes;
use media_protocol::{Internal, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Handler for control channel notifications: `(event, data)`.
pub type NotificationHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Handler for payload channel notifications: `(event, data, payload)`.
pub type PayloadHandler = Arc<dyn Fn(&str, &[u8], Bytes) + Send + Sync>;

/// Request/response channel to the worker, plus notification routing by
/// target id.
///
/// Notifications for one target must be delivered in the order the worker
/// emitted them, one at a time.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Send a request and wait for the worker's response body
    /// (`Value::Null` when the worker sends none).
    async fn request(
        &self,
        method: Method,
        internal: &Internal,
        body: Option<Value>,
    ) -> Result<Value, ChannelError>;

    /// Route notifications addressed to `target_id` to `handler`.
    fn subscribe(&self, target_id: &str, handler: NotificationHandler);

    /// Stop routing notifications addressed to `target_id`.
    fn unsubscribe(&self, target_id: &str);
}

/// Channel carrying high-volume binary notifications from the worker.
pub trait PayloadChannel: Send + Sync {
    /// Route payload notifications addressed to `target_id` to `handler`.
    fn subscribe(&self, target_id: &str, handler: PayloadHandler);

    /// Stop routing payload notifications addressed to `target_id`.
    fn unsubscribe(&self, target_id: &str);
}

/// Issue a request bounded by `timeout`, recording latency and failures.
pub(crate) async fn request_with_timeout(
    channel: &dyn ControlChannel,
    method: Method,
    internal: &Internal,
    body: Option<Value>,
    timeout: Duration,
) -> Result<Value, ChannelError> {
    let start = Instant::now();

    let result = match tokio::time::timeout(timeout, channel.request(method, internal, body)).await
    {
        Ok(result) => result,
        Err(_) => Err(ChannelError::Timeout {
            method: method.as_str(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    };

    metrics::record_channel_request(method.as_str(), start.elapsed());

    if let Err(ref err) = result {
        warn!(
            target: "mh.channel",
            method = %method,
            error = %err,
            "Worker request failed"
        );
        metrics::record_channel_request_error(method.as_str(), err.error_type());
    }

    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    /// Channel that answers after a fixed delay.
    struct SlowChannel {
        delay: Duration,
    }

    #[async_trait]
    impl ControlChannel for SlowChannel {
        async fn request(
            &self,
            _method: Method,
            _internal: &Internal,
            _body: Option<Value>,
        ) -> Result<Value, ChannelError> {
            tokio::time::sleep(self.delay).await;
            Ok(Value::Bool(true))
        }

        fn subscribe(&self, _target_id: &str, _handler: NotificationHandler) {}

        fn unsubscribe(&self, _target_id: &str) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_within_timeout() {
        let channel = SlowChannel {
            delay: Duration::from_millis(10),
        };

        let value = request_with_timeout(
            &channel,
            Method::ConsumerDump,
            &Internal::default(),
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(value, Value::Bool(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out() {
        let channel = SlowChannel {
            delay: Duration::from_secs(5),
        };

        let err = request_with_timeout(
            &channel,
            Method::ConsumerGetStats,
            &Internal::default(),
            None,
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ChannelError::Timeout {
                method: "consumer.getStats",
                timeout_ms: 100
            }
        ));
    }
}
