//! Property tests for protocol bodies.
//!
//! Decoding must be total over arbitrary input (errors, never panics), and an
//! encoded envelope must keep the identifier the client correlates on no
//! matter which options the caller attaches.

use ccs_proto::{Envelope, InboundMessage, MessageId, OutboundMessage, SendOptions};
use proptest::prelude::*;
use serde_json::{Value, json};

proptest! {
    #[test]
    fn prop_decode_never_panics(text in ".*") {
        let _ = InboundMessage::from_json(&text);
    }

    #[test]
    fn prop_generated_ids_are_hex(bytes in any::<[u8; 8]>()) {
        let id = MessageId::from_random(bytes);
        prop_assert_eq!(id.as_str().len(), 16);
        prop_assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn prop_options_never_shadow_envelope(
        keys in prop::collection::vec("[a-z_]{1,16}", 0..8),
        bytes in any::<[u8; 8]>(),
    ) {
        let mut options = SendOptions::new();
        for key in keys {
            options = match options.clone().with_extra(key, json!(1)) {
                Ok(next) => next,
                Err(_) => options,
            };
        }

        let id = MessageId::from_random(bytes);
        let envelope = Envelope::Downstream(OutboundMessage {
            to: "token".into(),
            message_id: id.clone(),
            data: None,
            options,
        });

        let value: Value = serde_json::from_str(&envelope.to_json()?).unwrap();
        prop_assert_eq!(value["to"].as_str(), Some("token"));
        prop_assert_eq!(value["message_id"].as_str(), Some(id.as_str()));
    }
}

#[test]
fn decoded_ack_round_trips_identifier() {
    let msg = InboundMessage::from_json(r#"{"message_type":"ack","message_id":"feed","from":"t"}"#)
        .unwrap()
        .unwrap();
    assert_eq!(msg.message_id, Some(MessageId::new("feed")));
}
