//! Mock worker channels for consumer testing.
//!
//! [`MockChannel`] records every request and answers from a per-method
//! script; [`MockPayloadChannel`] only routes payload notifications. Both
//! count subscribe/unsubscribe calls per target so tests can check that a
//! consumer releases its subscriptions exactly once.
//!
//! # Example
//!
//! ```rust,ignore
//! use mh_test_utils::MockChannel;
//!
//! let channel = MockChannel::new()
//!     .with_response(Method::ConsumerSetPriority, json!({ "priority": 5 }))
//!     .with_failure(Method::ConsumerPause, "worker gone");
//!
//! // Hand `Arc::new(channel.clone())` to the consumer, then inspect:
//! assert_eq!(channel.request_count(Method::ConsumerPause), 1);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use media_handler::channel::{
    ControlChannel, NotificationHandler, PayloadChannel, PayloadHandler,
};
use media_handler::errors::ChannelError;
use media_protocol::{Internal, Method};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A request received by [`MockChannel`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub internal: Internal,
    pub body: Option<Value>,
}

/// Scripted outcome for one method.
#[derive(Debug, Clone)]
enum Scripted {
    Respond(Value),
    RespondAfter(Duration, Value),
    Fail(String),
    Hang,
}

/// Mock control channel.
#[derive(Clone, Default)]
pub struct MockChannel {
    inner: Arc<Mutex<MockChannelInner>>,
}

#[derive(Default)]
struct MockChannelInner {
    requests: Vec<RecordedRequest>,
    script: HashMap<Method, Scripted>,
    handlers: HashMap<String, NotificationHandler>,
    subscribe_counts: HashMap<String, usize>,
    unsubscribe_counts: HashMap<String, usize>,
}

impl MockChannel {
    /// Create a channel answering `null` to every request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` with `value`.
    #[must_use]
    pub fn with_response(self, method: Method, value: Value) -> Self {
        self.set(method, Scripted::Respond(value));
        self
    }

    /// Answer `method` with `value` after `delay`.
    #[must_use]
    pub fn with_delayed_response(self, method: Method, delay: Duration, value: Value) -> Self {
        self.set(method, Scripted::RespondAfter(delay, value));
        self
    }

    /// Fail `method` with a worker error.
    #[must_use]
    pub fn with_failure(self, method: Method, reason: impl Into<String>) -> Self {
        self.set(method, Scripted::Fail(reason.into()));
        self
    }

    /// Never answer `method`.
    #[must_use]
    pub fn with_hang(self, method: Method) -> Self {
        self.set(method, Scripted::Hang);
        self
    }

    /// Change the answer for `method` after construction.
    pub fn respond(&self, method: Method, value: Value) {
        self.set(method, Scripted::Respond(value));
    }

    /// Make `method` fail from now on.
    pub fn fail(&self, method: Method, reason: impl Into<String>) {
        self.set(method, Scripted::Fail(reason.into()));
    }

    /// All requests received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Requests received for `method`.
    #[must_use]
    pub fn requests_for(&self, method: Method) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == method)
            .collect()
    }

    /// Number of requests received for `method`.
    #[must_use]
    pub fn request_count(&self, method: Method) -> usize {
        self.requests_for(method).len()
    }

    /// Whether a handler is currently subscribed for `target_id`.
    #[must_use]
    pub fn is_subscribed(&self, target_id: &str) -> bool {
        self.inner.lock().unwrap().handlers.contains_key(target_id)
    }

    /// Number of `subscribe` calls for `target_id`.
    #[must_use]
    pub fn subscribe_count(&self, target_id: &str) -> usize {
        count(&self.inner.lock().unwrap().subscribe_counts, target_id)
    }

    /// Number of `unsubscribe` calls for `target_id`.
    #[must_use]
    pub fn unsubscribe_count(&self, target_id: &str) -> usize {
        count(&self.inner.lock().unwrap().unsubscribe_counts, target_id)
    }

    /// Deliver a notification as the worker would.
    ///
    /// Returns `false` if nothing is subscribed for `target_id`. The handler
    /// runs outside the channel lock, so it may unsubscribe.
    pub fn notify(&self, target_id: &str, event: &str, data: &[u8]) -> bool {
        let handler = self.inner.lock().unwrap().handlers.get(target_id).cloned();
        match handler {
            Some(handler) => {
                handler(event, data);
                true
            }
            None => false,
        }
    }

    /// Handler currently registered for `target_id`. Calling it after
    /// `unsubscribe` mimics a notification already in flight at close.
    #[must_use]
    pub fn handler(&self, target_id: &str) -> Option<NotificationHandler> {
        self.inner.lock().unwrap().handlers.get(target_id).cloned()
    }

    /// Deliver a notification with a JSON body.
    pub fn notify_json(&self, target_id: &str, event: &str, body: &Value) -> bool {
        let data = serde_json::to_vec(body).unwrap();
        self.notify(target_id, event, &data)
    }

    fn set(&self, method: Method, scripted: Scripted) {
        self.inner.lock().unwrap().script.insert(method, scripted);
    }
}

#[async_trait]
impl ControlChannel for MockChannel {
    async fn request(
        &self,
        method: Method,
        internal: &Internal,
        body: Option<Value>,
    ) -> Result<Value, ChannelError> {
        let scripted = {
            let mut inner = self.inner.lock().unwrap();
            inner.requests.push(RecordedRequest {
                method,
                internal: internal.clone(),
                body,
            });
            inner.script.get(&method).cloned()
        };

        match scripted {
            None => Ok(Value::Null),
            Some(Scripted::Respond(value)) => Ok(value),
            Some(Scripted::RespondAfter(delay, value)) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Some(Scripted::Fail(reason)) => Err(ChannelError::Request {
                method: method.as_str(),
                reason,
            }),
            Some(Scripted::Hang) => std::future::pending().await,
        }
    }

    fn subscribe(&self, target_id: &str, handler: NotificationHandler) {
        let mut inner = self.inner.lock().unwrap();
        inner.handlers.insert(target_id.to_string(), handler);
        *inner
            .subscribe_counts
            .entry(target_id.to_string())
            .or_default() += 1;
    }

    fn unsubscribe(&self, target_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.handlers.remove(target_id);
        *inner
            .unsubscribe_counts
            .entry(target_id.to_string())
            .or_default() += 1;
    }
}

impl std::fmt::Debug for MockChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockChannel")
            .field("requests", &self.requests().len())
            .finish_non_exhaustive()
    }
}

/// Mock payload channel.
#[derive(Clone, Default)]
pub struct MockPayloadChannel {
    inner: Arc<Mutex<MockPayloadChannelInner>>,
}

#[derive(Default)]
struct MockPayloadChannelInner {
    handlers: HashMap<String, PayloadHandler>,
    subscribe_counts: HashMap<String, usize>,
    unsubscribe_counts: HashMap<String, usize>,
}

impl MockPayloadChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a handler is currently subscribed for `target_id`.
    #[must_use]
    pub fn is_subscribed(&self, target_id: &str) -> bool {
        self.inner.lock().unwrap().handlers.contains_key(target_id)
    }

    /// Number of `subscribe` calls for `target_id`.
    #[must_use]
    pub fn subscribe_count(&self, target_id: &str) -> usize {
        count(&self.inner.lock().unwrap().subscribe_counts, target_id)
    }

    /// Number of `unsubscribe` calls for `target_id`.
    #[must_use]
    pub fn unsubscribe_count(&self, target_id: &str) -> usize {
        count(&self.inner.lock().unwrap().unsubscribe_counts, target_id)
    }

    /// Deliver a payload notification. Returns `false` if nothing is
    /// subscribed for `target_id`.
    pub fn notify_payload(&self, target_id: &str, event: &str, payload: Bytes) -> bool {
        let handler = self.inner.lock().unwrap().handlers.get(target_id).cloned();
        match handler {
            Some(handler) => {
                handler(event, b"{}", payload);
                true
            }
            None => false,
        }
    }

    /// Handler currently registered for `target_id`.
    ///
    /// Holding on to it and calling it after `unsubscribe` mimics a
    /// dispatch that was already in flight when the consumer closed.
    #[must_use]
    pub fn handler(&self, target_id: &str) -> Option<PayloadHandler> {
        self.inner.lock().unwrap().handlers.get(target_id).cloned()
    }
}

impl PayloadChannel for MockPayloadChannel {
    fn subscribe(&self, target_id: &str, handler: PayloadHandler) {
        let mut inner = self.inner.lock().unwrap();
        inner.handlers.insert(target_id.to_string(), handler);
        *inner
            .subscribe_counts
            .entry(target_id.to_string())
            .or_default() += 1;
    }

    fn unsubscribe(&self, target_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.handlers.remove(target_id);
        *inner
            .unsubscribe_counts
            .entry(target_id.to_string())
            .or_default() += 1;
    }
}

fn count(counts: &HashMap<String, usize>, target_id: &str) -> usize {
    counts.get(target_id).copied().unwrap_or(0)
}
