//! Consumer payloads: notification bodies, request/response bodies, dumps and stats.

use crate::rtp::{MediaKind, RtpEncodingParameters, RtpParameters};
use common::types::{ConsumerId, ProducerId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Score reported before the worker sends its first `score` notification.
pub const DEFAULT_SCORE: u8 = 10;

/// Priority a consumer starts with and falls back to on `unsetPriority`.
pub const DEFAULT_PRIORITY: u32 = 1;

/// How the worker forwards the producer's streams to this consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerType {
    /// Single stream
    Simple,
    /// One of several simulcast streams
    Simulcast,
    /// Scalable video coding layers of a single stream
    Svc,
    /// All streams, for router-to-router piping
    Pipe,
}

/// Transmission quality scores (0-10) for the consumer and its producer.
///
/// Always replaced as a whole when a `score` notification arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerScore {
    /// Score of the consumer's outgoing RTP stream
    pub score: u8,
    /// Score of the currently selected producer stream
    pub producer_score: u8,
    /// Scores of every producer stream, ordered by encoding
    #[serde(default)]
    pub producer_scores: Vec<u8>,
}

impl Default for ConsumerScore {
    fn default() -> Self {
        Self {
            score: DEFAULT_SCORE,
            producer_score: DEFAULT_SCORE,
            producer_scores: Vec::new(),
        }
    }
}

/// Spatial/temporal layer pair (simulcast and SVC only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerLayers {
    /// Spatial layer index, from 0 to N
    pub spatial_layer: u8,
    /// Temporal layer index, from 0 to N
    #[serde(default)]
    pub temporal_layer: u8,
}

/// Trace event types the worker can be asked to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerTraceEventType {
    Rtp,
    Keyframe,
    Nack,
    Pli,
    Fir,
    /// A type this version does not know. Traces of this type are still
    /// delivered; it is not meant to be requested.
    #[serde(other)]
    Unknown,
}

/// Direction of a traced packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceDirection {
    In,
    Out,
}

/// Body of a `trace` notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerTraceEventData {
    /// Trace type
    #[serde(rename = "type")]
    pub kind: ConsumerTraceEventType,
    /// Worker timestamp of the event
    #[serde(default)]
    pub timestamp: u64,
    /// Packet direction, absent for traces that have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<TraceDirection>,
    /// Per-type details, passed through untouched
    #[serde(default)]
    pub info: Value,
}

/// Statistics of one RTP stream.
///
/// `getStats` returns the consumer's `outbound-rtp` entry followed by the
/// producer's `inbound-rtp` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsumerStat {
    #[serde(rename = "type")]
    pub stat_type: String,
    pub timestamp: u64,
    pub ssrc: u32,
    pub rtx_ssrc: Option<u32>,
    pub rid: Option<String>,
    pub kind: Option<MediaKind>,
    pub mime_type: String,
    pub packets_lost: u64,
    pub fraction_lost: u32,
    pub packets_discarded: u64,
    pub packets_retransmitted: u64,
    pub packets_repaired: u64,
    pub nack_count: u64,
    pub nack_packet_count: u64,
    pub pli_count: u64,
    pub fir_count: u64,
    pub score: u8,
    pub packet_count: u64,
    pub byte_count: u64,
    pub bitrate: u64,
    pub round_trip_time: Option<f64>,
    pub rtx_packets_discarded: Option<u64>,
}

/// Result of `consumer.dump`.
///
/// Fields the worker adds beyond these are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDump {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    #[serde(rename = "type")]
    pub consumer_type: ConsumerType,
    pub rtp_parameters: RtpParameters,
    #[serde(default)]
    pub consumable_rtp_encodings: Vec<RtpEncodingParameters>,
    #[serde(default)]
    pub supported_codec_payload_types: Vec<u8>,
    #[serde(default)]
    pub trace_event_types: Vec<ConsumerTraceEventType>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub producer_paused: bool,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub preferred_layers: Option<ConsumerLayers>,
    #[serde(default)]
    pub current_layers: Option<ConsumerLayers>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_priority() -> u32 {
    DEFAULT_PRIORITY
}

/// Body of `transport.closeConsumer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseConsumerRequest {
    pub consumer_id: ConsumerId,
}

/// Body of `consumer.setPriority`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPriorityRequest {
    pub priority: u32,
}

/// Response of `consumer.setPriority`; the worker echoes the applied value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityResult {
    pub priority: u32,
}

/// Body of `consumer.enableTraceEvent`.
///
/// `types` is always serialized, an empty list disables every trace type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableTraceEventRequest {
    pub types: Vec<ConsumerTraceEventType>,
}
