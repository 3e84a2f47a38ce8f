//! Control channel request addressing.

use common::types::{ConsumerId, ProducerId, RouterId, TransportId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request method understood by the worker.
///
/// Wire names are dotted `resource.action` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Close a consumer owned by a transport
    TransportCloseConsumer,
    /// Dump the consumer's internal state
    ConsumerDump,
    /// Fetch RTP stream statistics
    ConsumerGetStats,
    /// Pause media forwarding
    ConsumerPause,
    /// Resume media forwarding
    ConsumerResume,
    /// Select preferred spatial/temporal layers
    ConsumerSetPreferredLayers,
    /// Set the consumer's bandwidth allocation priority
    ConsumerSetPriority,
    /// Ask the producer for a key frame
    ConsumerRequestKeyFrame,
    /// Choose which trace event types the worker emits
    ConsumerEnableTraceEvent,
}

impl Method {
    /// Dotted wire name of this method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::TransportCloseConsumer => "transport.closeConsumer",
            Method::ConsumerDump => "consumer.dump",
            Method::ConsumerGetStats => "consumer.getStats",
            Method::ConsumerPause => "consumer.pause",
            Method::ConsumerResume => "consumer.resume",
            Method::ConsumerSetPreferredLayers => "consumer.setPreferredLayers",
            Method::ConsumerSetPriority => "consumer.setPriority",
            Method::ConsumerRequestKeyFrame => "consumer.requestKeyFrame",
            Method::ConsumerEnableTraceEvent => "consumer.enableTraceEvent",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity block attached to every request.
///
/// The worker resolves the target resource from these ids; ids that do not
/// apply to a request are left out of the JSON entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Internal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_id: Option<RouterId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_id: Option<TransportId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer_id: Option<ProducerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_id: Option<ConsumerId>,
}
