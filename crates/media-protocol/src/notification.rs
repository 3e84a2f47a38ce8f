//! Decoding of unsolicited worker notifications addressed to a consumer.
//!
//! Control channel notifications arrive as an event tag plus an optional JSON
//! body; payload channel notifications add a raw binary payload. Decoding
//! never panics: unknown tags and malformed bodies come back as errors so the
//! dispatcher can log them and carry on with the next event.

use crate::consumer::{ConsumerLayers, ConsumerScore, ConsumerTraceEventData};
use bytes::Bytes;

/// Error type for notification decoding
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Event tag this decoder does not know
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// Body could not be parsed for a known event
    #[error("Malformed {event} notification: {source}")]
    Malformed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl NotificationError {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            NotificationError::UnknownEvent(_) => "unknown_event",
            NotificationError::Malformed { .. } => "malformed",
        }
    }
}

/// Notification pushed by the worker over the control channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerNotification {
    /// The producer feeding this consumer was closed
    ProducerClose,
    /// The producer was paused
    ProducerPause,
    /// The producer was resumed
    ProducerResume,
    /// New transmission scores
    Score(ConsumerScore),
    /// Currently forwarded layers changed; `None` when nothing is forwarded
    LayersChange(Option<ConsumerLayers>),
    /// Trace event enabled through `consumer.enableTraceEvent`
    Trace(ConsumerTraceEventData),
}

impl ConsumerNotification {
    /// Wire tag of this notification.
    #[must_use]
    pub const fn event(&self) -> &'static str {
        match self {
            ConsumerNotification::ProducerClose => "producerclose",
            ConsumerNotification::ProducerPause => "producerpause",
            ConsumerNotification::ProducerResume => "producerresume",
            ConsumerNotification::Score(_) => "score",
            ConsumerNotification::LayersChange(_) => "layerschange",
            ConsumerNotification::Trace(_) => "trace",
        }
    }
}

/// Notification pushed by the worker over the payload channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadNotification {
    /// RTP packet forwarded to the application
    Rtp(Bytes),
}

/// Decode a control channel notification
///
/// # Errors
///
/// Returns an error if the tag is unknown or the body does not match the
/// shape expected for the tag
pub fn decode_notification(
    event: &str,
    data: &[u8],
) -> Result<ConsumerNotification, NotificationError> {
    match event {
        "producerclose" => Ok(ConsumerNotification::ProducerClose),
        "producerpause" => Ok(ConsumerNotification::ProducerPause),
        "producerresume" => Ok(ConsumerNotification::ProducerResume),
        "score" => serde_json::from_slice(data)
            .map(ConsumerNotification::Score)
            .map_err(|source| NotificationError::Malformed {
                event: "score",
                source,
            }),
        "layerschange" => {
            // An absent body means no layer is being forwarded.
            if data.iter().all(u8::is_ascii_whitespace) {
                return Ok(ConsumerNotification::LayersChange(None));
            }
            serde_json::from_slice::<Option<ConsumerLayers>>(data)
                .map(ConsumerNotification::LayersChange)
                .map_err(|source| NotificationError::Malformed {
                    event: "layerschange",
                    source,
                })
        }
        "trace" => serde_json::from_slice(data)
            .map(ConsumerNotification::Trace)
            .map_err(|source| NotificationError::Malformed {
                event: "trace",
                source,
            }),
        other => Err(NotificationError::UnknownEvent(other.to_string())),
    }
}

/// Decode a payload channel notification
///
/// # Errors
///
/// Returns an error if the tag is unknown
pub fn decode_payload_notification(
    event: &str,
    payload: Bytes,
) -> Result<PayloadNotification, NotificationError> {
    match event {
        "rtp" => Ok(PayloadNotification::Rtp(payload)),
        other => Err(NotificationError::UnknownEvent(other.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::consumer::{ConsumerTraceEventType, TraceDirection};

    #[test]
    fn test_decode_flag_events_ignore_body() {
        assert_eq!(
            decode_notification("producerclose", b"").unwrap(),
            ConsumerNotification::ProducerClose
        );
        assert_eq!(
            decode_notification("producerpause", b"{}").unwrap(),
            ConsumerNotification::ProducerPause
        );
        assert_eq!(
            decode_notification("producerresume", b"").unwrap(),
            ConsumerNotification::ProducerResume
        );
    }

    #[test]
    fn test_decode_score() {
        let notification =
            decode_notification("score", br#"{"score":5,"producerScore":7,"producerScores":[7,3]}"#)
                .unwrap();

        assert_eq!(
            notification,
            ConsumerNotification::Score(ConsumerScore {
                score: 5,
                producer_score: 7,
                producer_scores: vec![7, 3],
            })
        );
        assert_eq!(notification.event(), "score");
    }

    #[test]
    fn test_decode_layers_change() {
        assert_eq!(
            decode_notification("layerschange", br#"{"spatialLayer":2,"temporalLayer":1}"#)
                .unwrap(),
            ConsumerNotification::LayersChange(Some(ConsumerLayers {
                spatial_layer: 2,
                temporal_layer: 1,
            }))
        );
        assert_eq!(
            decode_notification("layerschange", b"null").unwrap(),
            ConsumerNotification::LayersChange(None)
        );
        assert_eq!(
            decode_notification("layerschange", b"").unwrap(),
            ConsumerNotification::LayersChange(None)
        );
    }

    #[test]
    fn test_decode_trace() {
        let notification = decode_notification(
            "trace",
            br#"{"type":"pli","timestamp":42,"direction":"in","info":{}}"#,
        )
        .unwrap();

        match notification {
            ConsumerNotification::Trace(trace) => {
                assert_eq!(trace.kind, ConsumerTraceEventType::Pli);
                assert_eq!(trace.direction, Some(TraceDirection::In));
                assert_eq!(trace.timestamp, 42);
            }
            other => unreachable!("expected trace, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_malformed_score() {
        let err = decode_notification("score", b"{not json").unwrap_err();
        assert!(matches!(err, NotificationError::Malformed { event: "score", .. }));
        assert_eq!(err.reason(), "malformed");
    }

    #[test]
    fn test_decode_unknown_event() {
        let err = decode_notification("bogus", b"").unwrap_err();
        assert!(matches!(err, NotificationError::UnknownEvent(ref tag) if tag == "bogus"));
        assert_eq!(err.reason(), "unknown_event");
    }

    #[test]
    fn test_decode_payload_notification() {
        let packet = Bytes::from_static(&[0x80, 0x60, 0x00, 0x01]);
        assert_eq!(
            decode_payload_notification("rtp", packet.clone()).unwrap(),
            PayloadNotification::Rtp(packet)
        );
        assert!(decode_payload_notification("rtcp", Bytes::new()).is_err());
    }
}
