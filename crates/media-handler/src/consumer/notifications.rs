//! Worker notification dispatch.
//!
//! Handlers hold a weak reference to the consumer so a subscription left
//! behind by a misbehaving channel never keeps the consumer alive.

use super::state::PauseEvent;
use super::{CloseReason, ConsumerInner};
use crate::events::ObserverEvent;
use crate::observability::metrics;

use bytes::Bytes;
use media_protocol::notification::{
    decode_notification, decode_payload_notification, ConsumerNotification, NotificationError,
    PayloadNotification,
};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// Register the control and payload handlers for `inner`.
pub(super) fn subscribe(inner: &Arc<ConsumerInner>) {
    let target_id = inner.identity.consumer_id.to_string();

    let weak: Weak<ConsumerInner> = Arc::downgrade(inner);
    inner.channel.subscribe(
        &target_id,
        Arc::new(move |event: &str, data: &[u8]| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_notification(event, data);
            }
        }),
    );

    let weak: Weak<ConsumerInner> = Arc::downgrade(inner);
    inner.payload_channel.subscribe(
        &target_id,
        Arc::new(move |event: &str, data: &[u8], payload: Bytes| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_payload(event, data, payload);
            }
        }),
    );
}

impl ConsumerInner {
    pub(super) fn handle_notification(&self, event: &str, data: &[u8]) {
        let notification = match decode_notification(event, data) {
            Ok(notification) => notification,
            Err(err) => {
                self.reject_notification(event, data, &err);
                return;
            }
        };

        // Dropped once closed. Checked before every mutation below as well,
        // since close may race with a handler already dispatched.
        if self.lock_state().closed {
            debug!(
                target: "mh.consumer.notification",
                consumer_id = %self.identity.consumer_id,
                event = notification.event(),
                "Ignoring notification for closed consumer"
            );
            return;
        }

        metrics::record_notification(notification.event());

        match notification {
            ConsumerNotification::ProducerClose => self.on_producer_close(),
            ConsumerNotification::ProducerPause => self.on_producer_paused(true),
            ConsumerNotification::ProducerResume => self.on_producer_paused(false),
            ConsumerNotification::Score(score) => {
                {
                    let mut state = self.lock_state();
                    if state.closed {
                        return;
                    }
                    state.score = score.clone();
                }
                self.events.score.emit(&score);
                self.observer.emit(ObserverEvent::Score(score));
            }
            ConsumerNotification::LayersChange(layers) => {
                {
                    let mut state = self.lock_state();
                    if state.closed {
                        return;
                    }
                    state.current_layers = layers;
                }
                self.events.layers_change.emit(&layers);
                self.observer.emit(ObserverEvent::LayersChange(layers));
            }
            ConsumerNotification::Trace(trace) => {
                self.events.trace.emit(&trace);
                self.observer.emit(ObserverEvent::Trace(trace));
            }
        }
    }

    pub(super) fn handle_payload(&self, event: &str, _data: &[u8], payload: Bytes) {
        if self.lock_state().closed {
            metrics::record_payload_dropped();
            return;
        }

        match decode_payload_notification(event, payload) {
            Ok(PayloadNotification::Rtp(packet)) => self.events.rtp.emit(&packet),
            Err(err) => {
                warn!(
                    target: "mh.consumer.notification",
                    consumer_id = %self.identity.consumer_id,
                    event,
                    error = %err,
                    "Ignoring unknown payload event"
                );
                metrics::record_notification_rejected(err.reason());
            }
        }
    }

    fn on_producer_close(&self) {
        if !self.lock_state().mark_closed() {
            return;
        }

        debug!(
            target: "mh.consumer.notification",
            consumer_id = %self.identity.consumer_id,
            "Producer closed, closing consumer"
        );

        self.unsubscribe();
        self.finalize_close(CloseReason::ProducerClosed);
    }

    fn on_producer_paused(&self, paused: bool) {
        let emit = {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            let Some(change) = state.set_producer_paused(paused) else {
                return;
            };
            state.push_pause_event(if paused {
                PauseEvent::ProducerPause
            } else {
                PauseEvent::ProducerResume
            });
            state.push_pause_change(change);
            state.begin_emitting()
        };

        if emit {
            self.drain_pause_events();
        }
    }

    fn reject_notification(&self, event: &str, data: &[u8], err: &NotificationError) {
        match err {
            NotificationError::UnknownEvent(_) => warn!(
                target: "mh.consumer.notification",
                consumer_id = %self.identity.consumer_id,
                event,
                "Ignoring unknown event"
            ),
            NotificationError::Malformed { .. } => error!(
                target: "mh.consumer.notification",
                consumer_id = %self.identity.consumer_id,
                event,
                data = %String::from_utf8_lossy(data),
                error = %err,
                "Failed to decode notification"
            ),
        }
        metrics::record_notification_rejected(err.reason());
    }
}
