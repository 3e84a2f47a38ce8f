//! Pre-configured consumers wired to mock channels.
//!
//! ```rust,ignore
//! let harness = TestConsumer::new().producer_paused().build();
//! harness.notify("producerresume", b"");
//! assert!(!harness.consumer.producer_paused());
//! ```

use crate::mock_channel::{MockChannel, MockPayloadChannel};
use bytes::Bytes;
use common::types::{ConsumerId, ProducerId, RouterId, TransportId};
use media_handler::config::ConsumerSettings;
use media_handler::consumer::{Consumer, ConsumerIdentity, ConsumerParams, NegotiatedParameters};
use media_handler::events::{HandlerSlot, ObserverEvent};
use media_protocol::consumer::{ConsumerLayers, ConsumerScore, ConsumerType};
use media_protocol::rtp::{MediaKind, RtpCodecParameters, RtpEncodingParameters, RtpParameters};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Opus audio RTP parameters with one encoding.
#[must_use]
pub fn audio_rtp_parameters() -> RtpParameters {
    RtpParameters {
        mid: Some("0".to_string()),
        codecs: vec![RtpCodecParameters {
            mime_type: "audio/opus".to_string(),
            payload_type: 100,
            clock_rate: 48_000,
            channels: Some(2),
            parameters: serde_json::Map::new(),
            rtcp_feedback: Vec::new(),
        }],
        encodings: vec![RtpEncodingParameters {
            ssrc: Some(11_111_111),
            ..RtpEncodingParameters::default()
        }],
        ..RtpParameters::default()
    }
}

/// Builder for a consumer under test.
#[derive(Debug, Clone)]
pub struct TestConsumer {
    kind: MediaKind,
    consumer_type: ConsumerType,
    paused: bool,
    producer_paused: bool,
    score: Option<ConsumerScore>,
    preferred_layers: Option<ConsumerLayers>,
    app_data: Value,
    settings: ConsumerSettings,
    channel: MockChannel,
}

impl Default for TestConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConsumer {
    /// Unpaused simple audio consumer with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: MediaKind::Audio,
            consumer_type: ConsumerType::Simple,
            paused: false,
            producer_paused: false,
            score: None,
            preferred_layers: None,
            app_data: Value::Null,
            settings: ConsumerSettings::default(),
            channel: MockChannel::new(),
        }
    }

    /// Simulcast video consumer.
    #[must_use]
    pub fn simulcast_video(mut self) -> Self {
        self.kind = MediaKind::Video;
        self.consumer_type = ConsumerType::Simulcast;
        self
    }

    /// Create the consumer paused.
    #[must_use]
    pub fn paused(mut self) -> Self {
        self.paused = true;
        self
    }

    /// Create the consumer with its producer paused.
    #[must_use]
    pub fn producer_paused(mut self) -> Self {
        self.producer_paused = true;
        self
    }

    #[must_use]
    pub fn with_score(mut self, score: ConsumerScore) -> Self {
        self.score = Some(score);
        self
    }

    #[must_use]
    pub fn with_preferred_layers(mut self, layers: ConsumerLayers) -> Self {
        self.preferred_layers = Some(layers);
        self
    }

    #[must_use]
    pub fn with_app_data(mut self, app_data: Value) -> Self {
        self.app_data = app_data;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ConsumerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use a pre-scripted control channel.
    #[must_use]
    pub fn with_channel(mut self, channel: MockChannel) -> Self {
        self.channel = channel;
        self
    }

    /// Build the consumer and return it with its mock channels.
    #[must_use]
    pub fn build(self) -> ConsumerHarness {
        let payload_channel = MockPayloadChannel::new();

        let consumer = Consumer::new(ConsumerParams {
            identity: ConsumerIdentity {
                router_id: RouterId::new(),
                transport_id: TransportId::new(),
                consumer_id: ConsumerId::new(),
                producer_id: ProducerId::new(),
            },
            parameters: NegotiatedParameters {
                kind: self.kind,
                consumer_type: self.consumer_type,
                rtp_parameters: audio_rtp_parameters(),
            },
            channel: Arc::new(self.channel.clone()),
            payload_channel: Arc::new(payload_channel.clone()),
            app_data: self.app_data,
            paused: self.paused,
            producer_paused: self.producer_paused,
            score: self.score,
            preferred_layers: self.preferred_layers,
            settings: self.settings,
        });

        ConsumerHarness {
            consumer,
            channel: self.channel,
            payload_channel,
        }
    }
}

/// A consumer plus the mock channels it is wired to.
pub struct ConsumerHarness {
    pub consumer: Consumer,
    pub channel: MockChannel,
    pub payload_channel: MockPayloadChannel,
}

impl ConsumerHarness {
    /// Subscription target id of the consumer.
    #[must_use]
    pub fn target_id(&self) -> String {
        self.consumer.id().to_string()
    }

    /// Deliver a control notification to the consumer.
    pub fn notify(&self, event: &str, data: &[u8]) -> bool {
        self.channel.notify(&self.target_id(), event, data)
    }

    /// Deliver a control notification with a JSON body.
    pub fn notify_json(&self, event: &str, body: &Value) -> bool {
        self.channel.notify_json(&self.target_id(), event, body)
    }

    /// Deliver a payload notification to the consumer.
    pub fn notify_payload(&self, event: &str, payload: Bytes) -> bool {
        self.payload_channel
            .notify_payload(&self.target_id(), event, payload)
    }

    /// Subscribe to the observer bus. Panics if the consumer is closed.
    #[must_use]
    pub fn observe(&self) -> broadcast::Receiver<ObserverEvent> {
        self.consumer
            .observer()
            .subscribe()
            .expect("observer open")
    }

    /// Record the names of every public event fired from now on.
    #[must_use]
    pub fn record_events(&self) -> EventLog {
        let log = EventLog::default();
        let events = self.consumer.events();

        log.track(&events.transport_close);
        log.track(&events.producer_close);
        log.track(&events.producer_pause);
        log.track(&events.producer_resume);
        log.track(&events.score);
        log.track(&events.layers_change);
        log.track(&events.rtp);
        log.track(&events.trace);
        log.track(&events.pause);
        log.track(&events.resume);
        log.track(&events.close);

        let signals = self.consumer.owner_signals();
        log.track(&signals.close);
        log.track(&signals.producer_close);

        log
    }
}

/// Ordered log of fired event names, shared with the listeners feeding it.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    names: Arc<Mutex<Vec<&'static str>>>,
}

impl EventLog {
    fn track<T: 'static>(&self, slot: &HandlerSlot<T>) {
        let names = Arc::clone(&self.names);
        let name = slot.name();
        slot.add(move |_| names.lock().unwrap().push(name));
    }

    /// Names of fired events, in firing order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.names.lock().unwrap().clone()
    }

    /// How many times `name` fired.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.names().iter().filter(|n| **n == name).count()
    }
}

/// Drain every event currently queued on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<ObserverEvent>) -> Vec<ObserverEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
        }
    }
}
