//! `Consumer` - client-side handle to a consumer living in the media worker.
//!
//! A consumer forwards one producer's media to an endpoint through a
//! transport. Its state is driven from two independent directions:
//!
//! - Application calls (`pause`, `set_priority`, ...) send a request to the
//!   worker and update local state once the worker confirms
//! - Worker notifications (producer paused, new score, ...) arrive on the
//!   control and payload channels and update state directly
//!
//! Both paths go through one state lock per consumer. Each transition is
//! decided and applied inside a single critical section, and listeners are
//! invoked after the lock is released. Pause and resume events are queued in
//! decision order and emitted by one thread at a time, so a local call racing
//! a producer notification cannot reorder them.
//!
//! A confirmed worker answer that arrives after the consumer closed is not
//! applied.
//!
//! # Lifecycle
//!
//! 1. Created by the owning transport once the worker has created the
//!    consumer; notification handlers are registered before the handle is
//!    returned
//! 2. Mutated by application calls and worker notifications
//! 3. Closed exactly once: by `close()`, by a `producerclose` notification,
//!    or by the owner calling `transport_closed()`

mod notifications;
mod state;

pub use state::CloseReason;

use crate::channel::{self, ControlChannel, PayloadChannel};
use crate::config::ConsumerSettings;
use crate::errors::MhError;
use crate::events::{ConsumerEvents, Observer, ObserverEvent, OwnerSignals};
use crate::observability::metrics;

use common::types::{ConsumerId, ProducerId, RouterId, TransportId};
use media_protocol::consumer::{
    CloseConsumerRequest, ConsumerDump, ConsumerLayers, ConsumerScore, ConsumerStat,
    ConsumerTraceEventType, ConsumerType, EnableTraceEventRequest, PriorityResult,
    SetPriorityRequest, DEFAULT_PRIORITY,
};
use media_protocol::rtp::{MediaKind, RtpParameters};
use media_protocol::{Internal, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use state::{ConsumerState, PauseEvent};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, instrument};

/// Application data attached at construction. Never inspected.
pub type AppData = Value;

/// Ids addressing a consumer inside the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerIdentity {
    pub router_id: RouterId,
    pub transport_id: TransportId,
    pub consumer_id: ConsumerId,
    pub producer_id: ProducerId,
}

impl ConsumerIdentity {
    /// Identity block sent with every request for this consumer.
    #[must_use]
    pub fn internal(&self) -> Internal {
        Internal {
            router_id: Some(self.router_id),
            transport_id: Some(self.transport_id),
            producer_id: Some(self.producer_id),
            consumer_id: Some(self.consumer_id),
        }
    }
}

/// Parameters negotiated with the worker at creation. Immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatedParameters {
    pub kind: MediaKind,
    pub consumer_type: ConsumerType,
    pub rtp_parameters: RtpParameters,
}

/// Everything the owning transport supplies to build a consumer.
pub struct ConsumerParams {
    pub identity: ConsumerIdentity,
    pub parameters: NegotiatedParameters,
    pub channel: Arc<dyn ControlChannel>,
    pub payload_channel: Arc<dyn PayloadChannel>,
    pub app_data: AppData,
    /// Whether the consumer was created paused.
    pub paused: bool,
    /// Whether the producer was paused at creation time.
    pub producer_paused: bool,
    /// Initial score; defaults to 10/10 with no per-stream scores.
    pub score: Option<ConsumerScore>,
    pub preferred_layers: Option<ConsumerLayers>,
    pub settings: ConsumerSettings,
}

/// Handle to a consumer. Clones share the same underlying consumer.
#[derive(Clone)]
pub struct Consumer {
    inner: Arc<ConsumerInner>,
}

struct ConsumerInner {
    identity: ConsumerIdentity,
    internal: Internal,
    parameters: NegotiatedParameters,
    app_data: AppData,
    channel: Arc<dyn ControlChannel>,
    payload_channel: Arc<dyn PayloadChannel>,
    settings: ConsumerSettings,
    state: Mutex<ConsumerState>,
    /// Serializes application calls that mutate state, so a request and
    /// its local update never interleave with another call's.
    ops: tokio::sync::Mutex<()>,
    events: ConsumerEvents,
    owner_signals: OwnerSignals,
    observer: Observer,
}

impl Consumer {
    /// Build a consumer and subscribe it to worker notifications.
    ///
    /// The subscriptions are in place before the handle is returned, so no
    /// notification sent after creation can be missed.
    #[must_use]
    pub fn new(params: ConsumerParams) -> Self {
        let ConsumerParams {
            identity,
            parameters,
            channel,
            payload_channel,
            app_data,
            paused,
            producer_paused,
            score,
            preferred_layers,
            settings,
        } = params;

        debug!(
            target: "mh.consumer",
            consumer_id = %identity.consumer_id,
            producer_id = %identity.producer_id,
            transport_id = %identity.transport_id,
            kind = ?parameters.kind,
            consumer_type = ?parameters.consumer_type,
            paused,
            producer_paused,
            "Consumer created"
        );

        let consumer = Self {
            inner: Arc::new(ConsumerInner {
                internal: identity.internal(),
                identity,
                parameters,
                app_data,
                channel,
                payload_channel,
                settings,
                state: Mutex::new(ConsumerState::new(
                    paused,
                    producer_paused,
                    score,
                    preferred_layers,
                )),
                ops: tokio::sync::Mutex::new(()),
                events: ConsumerEvents::new(),
                owner_signals: OwnerSignals::new(),
                observer: Observer::new(settings.observer_capacity),
            }),
        };

        notifications::subscribe(&consumer.inner);
        metrics::record_consumer_created();

        consumer
    }

    // ------------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------------

    /// Consumer id.
    #[must_use]
    pub fn id(&self) -> ConsumerId {
        self.inner.identity.consumer_id
    }

    /// Id of the producer being consumed.
    #[must_use]
    pub fn producer_id(&self) -> ProducerId {
        self.inner.identity.producer_id
    }

    #[must_use]
    pub fn identity(&self) -> &ConsumerIdentity {
        &self.inner.identity
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.inner.parameters.kind
    }

    #[must_use]
    pub fn consumer_type(&self) -> ConsumerType {
        self.inner.parameters.consumer_type
    }

    #[must_use]
    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.inner.parameters.rtp_parameters
    }

    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// Whether the consumer is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.lock_state().closed
    }

    /// Whether the consumer was paused locally.
    #[must_use]
    pub fn paused(&self) -> bool {
        self.inner.lock_state().paused
    }

    /// Whether the producer is paused.
    #[must_use]
    pub fn producer_paused(&self) -> bool {
        self.inner.lock_state().producer_paused
    }

    #[must_use]
    pub fn priority(&self) -> u32 {
        self.inner.lock_state().priority
    }

    #[must_use]
    pub fn score(&self) -> ConsumerScore {
        self.inner.lock_state().score.clone()
    }

    #[must_use]
    pub fn preferred_layers(&self) -> Option<ConsumerLayers> {
        self.inner.lock_state().preferred_layers
    }

    /// Layers currently forwarded (simulcast and SVC only).
    #[must_use]
    pub fn current_layers(&self) -> Option<ConsumerLayers> {
        self.inner.lock_state().current_layers
    }

    /// Public event listeners.
    #[must_use]
    pub fn events(&self) -> &ConsumerEvents {
        &self.inner.events
    }

    /// Signals reserved for the owning transport/router.
    #[must_use]
    pub fn owner_signals(&self) -> &OwnerSignals {
        &self.inner.owner_signals
    }

    /// Observer event bus.
    #[must_use]
    pub fn observer(&self) -> &Observer {
        &self.inner.observer
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Close the consumer.
    ///
    /// Only the first call has any effect. The worker is asked to close its
    /// side on a best-effort basis: a failed request is logged and the
    /// consumer is closed locally regardless.
    #[instrument(skip_all, name = "mh.consumer.close", fields(consumer_id = %self.id()))]
    pub async fn close(&self) {
        if !self.inner.lock_state().mark_closed() {
            return;
        }

        debug!(target: "mh.consumer", consumer_id = %self.id(), "close()");

        self.inner.unsubscribe();

        let result = match encode(
            Method::TransportCloseConsumer,
            &CloseConsumerRequest {
                consumer_id: self.id(),
            },
        ) {
            Ok(body) => self
                .inner
                .request(Method::TransportCloseConsumer, Some(body))
                .await
                .map(drop),
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            error!(
                target: "mh.consumer",
                consumer_id = %self.id(),
                error = %err,
                "Consumer close failed"
            );
        }

        self.inner.finalize_close(CloseReason::Explicit);
    }

    /// Called by the owning transport when it closes.
    ///
    /// The worker has already dropped the consumer with its transport, so
    /// no request is sent.
    pub fn transport_closed(&self) {
        if !self.inner.lock_state().mark_closed() {
            return;
        }

        debug!(target: "mh.consumer", consumer_id = %self.id(), "transportClosed()");

        self.inner.unsubscribe();
        self.inner.finalize_close(CloseReason::TransportClosed);
    }

    // ------------------------------------------------------------------------
    // Pause / resume
    // ------------------------------------------------------------------------

    /// Pause the consumer.
    ///
    /// Observer `pause` fires only if the consumer was not already
    /// effectively paused (locally or by its producer). If another thread is
    /// emitting pause events at that moment, it emits this one after its own.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the worker rejects the request; local
    /// state is left untouched in that case.
    #[instrument(skip_all, name = "mh.consumer.pause", fields(consumer_id = %self.id()))]
    pub async fn pause(&self) -> Result<(), MhError> {
        let _gate = self.inner.ops.lock().await;

        debug!(target: "mh.consumer", consumer_id = %self.id(), "pause()");

        self.inner.request(Method::ConsumerPause, None).await?;
        self.inner.apply_local_paused(true);

        Ok(())
    }

    /// Resume the consumer.
    ///
    /// Observer `resume` fires only if the consumer was effectively paused
    /// and its producer is not paused.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the worker rejects the request; local
    /// state is left untouched in that case.
    #[instrument(skip_all, name = "mh.consumer.resume", fields(consumer_id = %self.id()))]
    pub async fn resume(&self) -> Result<(), MhError> {
        let _gate = self.inner.ops.lock().await;

        debug!(target: "mh.consumer", consumer_id = %self.id(), "resume()");

        self.inner.request(Method::ConsumerResume, None).await?;
        self.inner.apply_local_paused(false);

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Parameter requests
    // ------------------------------------------------------------------------

    /// Set preferred video layers.
    ///
    /// The worker answers with the layers it will actually target, which
    /// become the new preferred layers.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    #[instrument(skip_all, name = "mh.consumer.set_preferred_layers", fields(consumer_id = %self.id()))]
    pub async fn set_preferred_layers(&self, layers: ConsumerLayers) -> Result<(), MhError> {
        let _gate = self.inner.ops.lock().await;

        debug!(target: "mh.consumer", consumer_id = %self.id(), ?layers, "setPreferredLayers()");

        let method = Method::ConsumerSetPreferredLayers;
        let body = encode(method, &layers)?;
        let response = self.inner.request(method, Some(body)).await?;
        let preferred: Option<ConsumerLayers> = self.inner.decode(method, response)?;

        let mut state = self.inner.lock_state();
        if !state.closed {
            state.preferred_layers = preferred;
        }

        Ok(())
    }

    /// Set the consumer's priority for bandwidth allocation.
    ///
    /// The stored priority is the value echoed by the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    #[instrument(skip_all, name = "mh.consumer.set_priority", fields(consumer_id = %self.id()))]
    pub async fn set_priority(&self, priority: u32) -> Result<(), MhError> {
        let _gate = self.inner.ops.lock().await;

        debug!(target: "mh.consumer", consumer_id = %self.id(), priority, "setPriority()");

        let method = Method::ConsumerSetPriority;
        let body = encode(method, &SetPriorityRequest { priority })?;
        let response = self.inner.request(method, Some(body)).await?;
        let result: PriorityResult = self.inner.decode(method, response)?;

        let mut state = self.inner.lock_state();
        if !state.closed {
            state.priority = result.priority;
        }

        Ok(())
    }

    /// Restore the default priority.
    ///
    /// # Errors
    ///
    /// Same as [`Consumer::set_priority`].
    pub async fn unset_priority(&self) -> Result<(), MhError> {
        debug!(target: "mh.consumer", consumer_id = %self.id(), "unsetPriority()");

        self.set_priority(DEFAULT_PRIORITY).await
    }

    /// Request a key frame from the producer.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the request fails.
    #[instrument(skip_all, name = "mh.consumer.request_key_frame", fields(consumer_id = %self.id()))]
    pub async fn request_key_frame(&self) -> Result<(), MhError> {
        debug!(target: "mh.consumer", consumer_id = %self.id(), "requestKeyFrame()");

        self.inner
            .request(Method::ConsumerRequestKeyFrame, None)
            .await
            .map(drop)
    }

    /// Choose which trace events the worker emits. An empty slice disables
    /// all of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip_all, name = "mh.consumer.enable_trace_event", fields(consumer_id = %self.id()))]
    pub async fn enable_trace_event(
        &self,
        types: &[ConsumerTraceEventType],
    ) -> Result<(), MhError> {
        debug!(target: "mh.consumer", consumer_id = %self.id(), ?types, "enableTraceEvent()");

        let method = Method::ConsumerEnableTraceEvent;
        let body = encode(
            method,
            &EnableTraceEventRequest {
                types: types.to_vec(),
            },
        )?;

        self.inner.request(method, Some(body)).await.map(drop)
    }

    /// Dump the consumer's worker-side state.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    #[instrument(skip_all, name = "mh.consumer.dump", fields(consumer_id = %self.id()))]
    pub async fn dump(&self) -> Result<ConsumerDump, MhError> {
        debug!(target: "mh.consumer", consumer_id = %self.id(), "dump()");

        let response = self.inner.request(Method::ConsumerDump, None).await?;
        self.inner.decode(Method::ConsumerDump, response)
    }

    /// Fetch RTP statistics for the consumer and its producer stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    #[instrument(skip_all, name = "mh.consumer.get_stats", fields(consumer_id = %self.id()))]
    pub async fn get_stats(&self) -> Result<Vec<ConsumerStat>, MhError> {
        debug!(target: "mh.consumer", consumer_id = %self.id(), "getStats()");

        let response = self.inner.request(Method::ConsumerGetStats, None).await?;
        self.inner.decode(Method::ConsumerGetStats, response)
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("identity", &self.inner.identity)
            .field("parameters", &self.inner.parameters)
            .field("state", &*self.inner.lock_state())
            .finish_non_exhaustive()
    }
}

fn encode<T: Serialize>(method: Method, body: &T) -> Result<Value, MhError> {
    serde_json::to_value(body).map_err(|source| MhError::Encode {
        method: method.as_str(),
        source,
    })
}

impl ConsumerInner {
    fn lock_state(&self) -> MutexGuard<'_, ConsumerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn request(&self, method: Method, body: Option<Value>) -> Result<Value, MhError> {
        channel::request_with_timeout(
            self.channel.as_ref(),
            method,
            &self.internal,
            body,
            self.settings.request_timeout,
        )
        .await
        .map_err(MhError::from)
    }

    fn decode<T: DeserializeOwned>(&self, method: Method, response: Value) -> Result<T, MhError> {
        serde_json::from_value(response).map_err(|source| {
            error!(
                target: "mh.consumer",
                consumer_id = %self.identity.consumer_id,
                method = %method,
                error = %source,
                "Invalid worker response"
            );
            MhError::Decode {
                method: method.as_str(),
                source,
            }
        })
    }

    /// Remove both channel subscriptions, stopping further notifications.
    fn unsubscribe(&self) {
        let target_id = self.identity.consumer_id.to_string();
        self.channel.unsubscribe(&target_id);
        self.payload_channel.unsubscribe(&target_id);
    }

    /// Apply a worker-confirmed `pause()`/`resume()`.
    fn apply_local_paused(&self, paused: bool) {
        let emit = {
            let mut state = self.lock_state();
            if state.closed {
                debug!(
                    target: "mh.consumer",
                    consumer_id = %self.identity.consumer_id,
                    paused,
                    "Consumer closed while waiting for the worker, not applied"
                );
                return;
            }
            let change = state.set_local_paused(paused);
            state.push_pause_change(change);
            state.begin_emitting()
        };

        if emit {
            self.drain_pause_events();
        }
    }

    /// Emit queued pause events until the queue is empty.
    ///
    /// Only the caller that won `begin_emitting()` may run this. Events
    /// queued by other threads meanwhile are emitted here too.
    fn drain_pause_events(&self) {
        loop {
            let next = self.lock_state().next_pause_event();
            let Some(event) = next else {
                return;
            };

            match event {
                PauseEvent::ProducerPause => self.events.producer_pause.emit(&()),
                PauseEvent::ProducerResume => self.events.producer_resume.emit(&()),
                PauseEvent::Pause => {
                    self.observer.emit(ObserverEvent::Pause);
                    self.events.pause.emit(&());
                }
                PauseEvent::Resume => {
                    self.observer.emit(ObserverEvent::Resume);
                    self.events.resume.emit(&());
                }
            }
        }
    }

    /// Emit the close events for `reason` and release every listener.
    ///
    /// Must only run after `mark_closed()` returned `true`.
    fn finalize_close(&self, reason: CloseReason) {
        match reason {
            CloseReason::Explicit => {
                self.owner_signals.close.emit(&());
            }
            CloseReason::ProducerClosed => {
                self.owner_signals.producer_close.emit(&());
                self.events.producer_close.emit(&());
            }
            CloseReason::TransportClosed => {
                self.events.transport_close.emit(&());
            }
        }

        self.observer.close();
        self.events.close.emit(&());

        self.events.clear_all();
        self.owner_signals.clear_all();

        metrics::record_consumer_closed(reason.as_str());
    }
}
