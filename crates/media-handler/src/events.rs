//! Event surfaces exposed by a consumer.
//!
//! Three surfaces, each with a fixed set of events:
//!
//! - [`ConsumerEvents`] - typed listener slots for applications
//! - [`OwnerSignals`] - signals for the transport/router that owns the consumer
//! - [`Observer`] - bounded broadcast bus mirroring lifecycle changes
//!
//! Listener panics are caught and logged so one faulty listener cannot take
//! down notification dispatch.

use crate::observability::metrics;

use bytes::Bytes;
use media_protocol::consumer::{ConsumerLayers, ConsumerScore, ConsumerTraceEventData};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::error;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Listener list for one named event.
pub struct HandlerSlot<T> {
    name: &'static str,
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T> HandlerSlot<T> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Event name, as used in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a listener.
    pub fn add<F>(&self, listener: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.lock().push(Arc::new(listener));
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Invoke every listener with `value`.
    ///
    /// Listeners run outside the slot lock, so they may register further
    /// listeners or query the consumer.
    pub(crate) fn emit(&self, value: &T) {
        let listeners: Vec<Listener<T>> = self.lock().clone();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(value))).is_err() {
                error!(
                    target: "mh.events",
                    event = self.name,
                    "Listener panicked, continuing with remaining listeners"
                );
                metrics::record_listener_panic(self.name);
            }
        }
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Listener<T>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Public events of a consumer.
pub struct ConsumerEvents {
    /// The owning transport was closed.
    pub transport_close: HandlerSlot<()>,
    /// The producer feeding this consumer was closed.
    pub producer_close: HandlerSlot<()>,
    /// The producer was paused.
    pub producer_pause: HandlerSlot<()>,
    /// The producer was resumed.
    pub producer_resume: HandlerSlot<()>,
    /// New transmission scores.
    pub score: HandlerSlot<ConsumerScore>,
    /// Forwarded layers changed.
    pub layers_change: HandlerSlot<Option<ConsumerLayers>>,
    /// RTP packet from the payload channel.
    pub rtp: HandlerSlot<Bytes>,
    /// Trace event.
    pub trace: HandlerSlot<ConsumerTraceEventData>,
    /// The consumer became effectively paused.
    pub pause: HandlerSlot<()>,
    /// The consumer stopped being effectively paused.
    pub resume: HandlerSlot<()>,
    /// The consumer was closed, for any reason.
    pub close: HandlerSlot<()>,
}

impl ConsumerEvents {
    pub(crate) fn new() -> Self {
        Self {
            transport_close: HandlerSlot::new("transportclose"),
            producer_close: HandlerSlot::new("producerclose"),
            producer_pause: HandlerSlot::new("producerpause"),
            producer_resume: HandlerSlot::new("producerresume"),
            score: HandlerSlot::new("score"),
            layers_change: HandlerSlot::new("layerschange"),
            rtp: HandlerSlot::new("rtp"),
            trace: HandlerSlot::new("trace"),
            pause: HandlerSlot::new("pause"),
            resume: HandlerSlot::new("resume"),
            close: HandlerSlot::new("close"),
        }
    }

    pub(crate) fn clear_all(&self) {
        self.transport_close.clear();
        self.producer_close.clear();
        self.producer_pause.clear();
        self.producer_resume.clear();
        self.score.clear();
        self.layers_change.clear();
        self.rtp.clear();
        self.trace.clear();
        self.pause.clear();
        self.resume.clear();
        self.close.clear();
    }
}

/// Signals for the collaborator that owns the consumer, used to drop it
/// from its registries.
pub struct OwnerSignals {
    /// Fired when the application closed the consumer.
    pub close: HandlerSlot<()>,
    /// Fired when the worker reported the producer closed.
    pub producer_close: HandlerSlot<()>,
}

impl OwnerSignals {
    pub(crate) fn new() -> Self {
        Self {
            close: HandlerSlot::new("@close"),
            producer_close: HandlerSlot::new("@producerclose"),
        }
    }

    pub(crate) fn clear_all(&self) {
        self.close.clear();
        self.producer_close.clear();
    }
}

/// Event published on the observer bus.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent {
    Close,
    Pause,
    Resume,
    Score(ConsumerScore),
    LayersChange(Option<ConsumerLayers>),
    Trace(ConsumerTraceEventData),
}

/// Bounded broadcast bus of [`ObserverEvent`]s.
///
/// Receivers that fall more than the capacity behind lose the oldest events
/// and see `RecvError::Lagged`. Once the consumer closes, the bus publishes
/// `Close` and then shuts, so receivers drain and observe `RecvError::Closed`.
pub struct Observer {
    sender: Mutex<Option<broadcast::Sender<ObserverEvent>>>,
}

impl Observer {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Subscribe to observer events. Returns `None` once the consumer closed.
    #[must_use]
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ObserverEvent>> {
        self.lock().as_ref().map(broadcast::Sender::subscribe)
    }

    pub(crate) fn emit(&self, event: ObserverEvent) {
        if let Some(sender) = self.lock().as_ref() {
            // No receivers is not an error for an observer.
            let _ = sender.send(event);
        }
    }

    /// Publish `Close` and release every receiver.
    pub(crate) fn close(&self) {
        if let Some(sender) = self.lock().take() {
            let _ = sender.send(ObserverEvent::Close);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<broadcast::Sender<ObserverEvent>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
