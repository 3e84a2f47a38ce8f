#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use media_protocol::notification::{decode_notification, decode_payload_notification};

const EVENTS: [&str; 7] = [
    "producerclose",
    "producerpause",
    "producerresume",
    "score",
    "layerschange",
    "trace",
    "rtp",
];

fuzz_target!(|data: &[u8]| {
    // First byte picks the event tag, the rest is the body
    let Some((selector, body)) = data.split_first() else {
        return;
    };
    let event = EVENTS[usize::from(*selector) % EVENTS.len()];

    // Decoding must only ever return Err for bad input, never panic
    let _ = decode_notification(event, body);
    let _ = decode_payload_notification(event, Bytes::copy_from_slice(body));
});
