//! Fuzz target for inbound decoding and classification
//!
//! Arbitrary stanza bodies must never panic the decoder or the router.
//! Every input classifies to exactly one event; undecodable input becomes
//! `Malformed`, never an error that escapes.

#![no_main]

use ccs_core::{classify, InboundEvent, Malformed};
use ccs_proto::{InboundMessage, RawInbound};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data).into_owned();

    let decoded = InboundMessage::from_json(&text);
    let event = classify(&RawInbound::Message(text));

    if decoded.is_err() {
        assert!(matches!(event, InboundEvent::Malformed(Malformed::Undecodable(_))));
    }
    if let InboundEvent::Upstream { from, .. } = &event {
        assert!(!from.is_empty(), "upstream classified without a sender");
    }
});
