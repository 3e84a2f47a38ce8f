//! Parameter request tests: request bodies, response decoding and error
//! propagation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use media_handler::errors::{ChannelError, MhError};
use media_protocol::consumer::{ConsumerLayers, ConsumerTraceEventType, ConsumerType};
use media_protocol::rtp::MediaKind;
use media_protocol::Method;
use mh_test_utils::{MockChannel, TestConsumer};
use serde_json::json;
use std::time::Duration;

fn last_body(channel: &MockChannel, method: Method) -> Option<serde_json::Value> {
    channel
        .requests_for(method)
        .last()
        .and_then(|request| request.body.clone())
}

// ============================================================================
// Priority
// ============================================================================

#[tokio::test]
async fn test_set_priority_stores_worker_value() {
    let channel =
        MockChannel::new().with_response(Method::ConsumerSetPriority, json!({ "priority": 5 }));
    let harness = TestConsumer::new().with_channel(channel).build();

    harness.consumer.set_priority(5).await.unwrap();

    assert_eq!(harness.consumer.priority(), 5);
    assert_eq!(
        last_body(&harness.channel, Method::ConsumerSetPriority),
        Some(json!({ "priority": 5 }))
    );
}

#[tokio::test]
async fn test_unset_priority_sends_default() {
    let channel =
        MockChannel::new().with_response(Method::ConsumerSetPriority, json!({ "priority": 7 }));
    let harness = TestConsumer::new().with_channel(channel).build();
    harness.consumer.set_priority(7).await.unwrap();

    harness
        .channel
        .respond(Method::ConsumerSetPriority, json!({ "priority": 1 }));
    harness.consumer.unset_priority().await.unwrap();

    assert_eq!(harness.consumer.priority(), 1);
    assert_eq!(
        last_body(&harness.channel, Method::ConsumerSetPriority),
        Some(json!({ "priority": 1 }))
    );
}

#[tokio::test]
async fn test_set_priority_failure_keeps_priority() {
    let channel = MockChannel::new().with_failure(Method::ConsumerSetPriority, "rejected");
    let harness = TestConsumer::new().with_channel(channel).build();

    let err = harness.consumer.set_priority(3).await.unwrap_err();

    assert!(matches!(err, MhError::Channel(ChannelError::Request { .. })));
    assert_eq!(harness.consumer.priority(), 1);
}

#[tokio::test]
async fn test_set_priority_malformed_response() {
    let channel = MockChannel::new().with_response(Method::ConsumerSetPriority, json!("high"));
    let harness = TestConsumer::new().with_channel(channel).build();

    let err = harness.consumer.set_priority(3).await.unwrap_err();

    assert!(matches!(
        err,
        MhError::Decode {
            method: "consumer.setPriority",
            ..
        }
    ));
    assert_eq!(err.error_type(), "decode");
    assert_eq!(harness.consumer.priority(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_priority_answered_after_close_is_not_applied() {
    let channel = MockChannel::new().with_delayed_response(
        Method::ConsumerSetPriority,
        Duration::from_millis(50),
        json!({ "priority": 5 }),
    );
    let harness = TestConsumer::new().with_channel(channel).build();

    let consumer = harness.consumer.clone();
    let request = tokio::spawn(async move { consumer.set_priority(5).await });
    tokio::task::yield_now().await;
    harness.consumer.close().await;

    request.await.unwrap().unwrap();

    assert!(harness.consumer.closed());
    assert_eq!(harness.consumer.priority(), 1);
}

// ============================================================================
// Preferred layers
// ============================================================================

#[tokio::test]
async fn test_set_preferred_layers_stores_worker_answer() {
    let channel = MockChannel::new().with_response(
        Method::ConsumerSetPreferredLayers,
        json!({ "spatialLayer": 1, "temporalLayer": 0 }),
    );
    let harness = TestConsumer::new()
        .simulcast_video()
        .with_channel(channel)
        .build();

    harness
        .consumer
        .set_preferred_layers(ConsumerLayers {
            spatial_layer: 2,
            temporal_layer: 1,
        })
        .await
        .unwrap();

    assert_eq!(
        last_body(&harness.channel, Method::ConsumerSetPreferredLayers),
        Some(json!({ "spatialLayer": 2, "temporalLayer": 1 }))
    );
    assert_eq!(
        harness.consumer.preferred_layers(),
        Some(ConsumerLayers {
            spatial_layer: 1,
            temporal_layer: 0,
        })
    );
}

#[tokio::test]
async fn test_set_preferred_layers_null_answer_clears() {
    let harness = TestConsumer::new()
        .simulcast_video()
        .with_preferred_layers(ConsumerLayers {
            spatial_layer: 0,
            temporal_layer: 0,
        })
        .build();

    harness
        .consumer
        .set_preferred_layers(ConsumerLayers {
            spatial_layer: 3,
            temporal_layer: 0,
        })
        .await
        .unwrap();

    assert_eq!(harness.consumer.preferred_layers(), None);
}

#[tokio::test(start_paused = true)]
async fn test_preferred_layers_answered_after_close_are_not_applied() {
    let channel = MockChannel::new().with_delayed_response(
        Method::ConsumerSetPreferredLayers,
        Duration::from_millis(50),
        json!({ "spatialLayer": 2, "temporalLayer": 0 }),
    );
    let harness = TestConsumer::new()
        .simulcast_video()
        .with_channel(channel)
        .build();

    let consumer = harness.consumer.clone();
    let request = tokio::spawn(async move {
        consumer
            .set_preferred_layers(ConsumerLayers {
                spatial_layer: 2,
                temporal_layer: 0,
            })
            .await
    });
    tokio::task::yield_now().await;
    harness.consumer.transport_closed();

    request.await.unwrap().unwrap();

    assert_eq!(harness.consumer.preferred_layers(), None);
}

// ============================================================================
// Key frames and tracing
// ============================================================================

#[tokio::test]
async fn test_request_key_frame() {
    let harness = TestConsumer::new().build();

    harness.consumer.request_key_frame().await.unwrap();

    let requests = harness.channel.requests_for(Method::ConsumerRequestKeyFrame);
    assert_eq!(requests.len(), 1);
    let request = requests.first().unwrap();
    assert_eq!(request.body, None);
    assert_eq!(request.internal, harness.consumer.identity().internal());
}

#[tokio::test]
async fn test_enable_trace_event_sends_explicit_empty_list() {
    let harness = TestConsumer::new().build();

    harness.consumer.enable_trace_event(&[]).await.unwrap();

    assert_eq!(
        last_body(&harness.channel, Method::ConsumerEnableTraceEvent),
        Some(json!({ "types": [] }))
    );
}

#[tokio::test]
async fn test_enable_trace_event_types() {
    let harness = TestConsumer::new().build();

    harness
        .consumer
        .enable_trace_event(&[ConsumerTraceEventType::Pli, ConsumerTraceEventType::Keyframe])
        .await
        .unwrap();

    assert_eq!(
        last_body(&harness.channel, Method::ConsumerEnableTraceEvent),
        Some(json!({ "types": ["pli", "keyframe"] }))
    );
}

// ============================================================================
// Dump and stats
// ============================================================================

#[tokio::test]
async fn test_dump() {
    let harness = TestConsumer::new().build();
    let consumer_id = harness.consumer.id();
    let producer_id = harness.consumer.producer_id();
    harness.channel.respond(
        Method::ConsumerDump,
        json!({
            "id": consumer_id,
            "producerId": producer_id,
            "kind": "audio",
            "type": "simple",
            "rtpParameters": { "codecs": [], "encodings": [] },
            "paused": true,
            "priority": 4,
            "traceEventTypes": ["rtp"],
            "rtpStream": { "score": 9 }
        }),
    );

    let dump = harness.consumer.dump().await.unwrap();

    assert_eq!(dump.id, consumer_id);
    assert_eq!(dump.producer_id, producer_id);
    assert_eq!(dump.kind, MediaKind::Audio);
    assert_eq!(dump.consumer_type, ConsumerType::Simple);
    assert!(dump.paused);
    assert_eq!(dump.priority, 4);
    assert_eq!(dump.trace_event_types, vec![ConsumerTraceEventType::Rtp]);
    assert!(dump.extra.contains_key("rtpStream"));

    // Dump is read-only.
    assert!(!harness.consumer.paused());
    assert_eq!(harness.consumer.priority(), 1);
}

#[tokio::test]
async fn test_get_stats() {
    let harness = TestConsumer::new().build();
    harness.channel.respond(
        Method::ConsumerGetStats,
        json!([
            { "type": "outbound-rtp", "timestamp": 10, "ssrc": 1111, "score": 10, "packetCount": 42 },
            { "type": "inbound-rtp", "timestamp": 10, "ssrc": 2222, "score": 9 }
        ]),
    );

    let stats = harness.consumer.get_stats().await.unwrap();

    assert_eq!(stats.len(), 2);
    let outbound = stats.first().unwrap();
    assert_eq!(outbound.stat_type, "outbound-rtp");
    assert_eq!(outbound.packet_count, 42);
    assert_eq!(stats.get(1).unwrap().ssrc, 2222);
}

#[tokio::test]
async fn test_get_stats_failure_propagates() {
    let channel = MockChannel::new().with_failure(Method::ConsumerGetStats, "worker died");
    let harness = TestConsumer::new().with_channel(channel).build();

    let err = harness.consumer.get_stats().await.unwrap_err();

    assert_eq!(err.error_type(), "request");
    assert!(err.to_string().contains("worker died"));
}

#[tokio::test]
async fn test_requests_after_close_are_still_sent() {
    let harness = TestConsumer::new().build();
    harness.consumer.close().await;

    harness.consumer.request_key_frame().await.unwrap();

    assert_eq!(
        harness.channel.request_count(Method::ConsumerRequestKeyFrame),
        1
    );
}
