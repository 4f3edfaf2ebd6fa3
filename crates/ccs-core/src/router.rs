//! Inbound message classification.
//!
//! [`classify`] turns whatever the transport delivered into one
//! [`InboundEvent`]. It is total: every input, including garbage, maps to
//! some event, and [`Malformed`] inputs are dropped by the session rather
//! than surfaced as errors. Dispatch of the classified event lives in
//! [`crate::Session::on_inbound`].

use ccs_proto::{
    CONTROL_CONNECTION_DRAINING, InboundMessage, MessageId, MessageType, RawInbound,
};
use serde_json::Value;

/// Control signal carried by a `control` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    /// Server will close this connection soon
    ConnectionDraining,
    /// Any other (or missing) `control_type`
    Other(Option<String>),
}

/// Why an inbound message was not routable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Malformed {
    /// Body is not valid JSON or has the wrong shape
    Undecodable(String),
    /// Body has no (or an empty) `message_id`
    MissingMessageId,
    /// Upstream message without a sender to acknowledge
    MissingSender {
        /// Identifier of the message
        message_id: MessageId,
    },
    /// Transport-level error message
    ErrorStanza {
        /// Error text, if any
        text: Option<String>,
    },
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Server control signal
    Control {
        /// Identifier of the control message
        message_id: MessageId,
        /// Signal carried
        signal: ControlSignal,
    },
    /// Downstream message accepted
    Ack {
        /// Acknowledged message
        message_id: MessageId,
        /// Recipient reported by the server
        from: Option<String>,
    },
    /// Downstream message refused
    Nack {
        /// Refused message
        message_id: MessageId,
        /// Recipient reported by the server
        from: Option<String>,
        /// Error code
        error: Option<String>,
        /// Error detail
        description: Option<String>,
    },
    /// Delivery receipt for an earlier downstream message
    Receipt {
        /// Identifier of the receipt
        message_id: MessageId,
        /// Sender of the receipt
        from: Option<String>,
        /// Application category
        category: Option<String>,
        /// Receipt details
        data: Option<Value>,
    },
    /// Device-originated message
    Upstream {
        /// Identifier to acknowledge
        message_id: MessageId,
        /// Device that sent it
        from: String,
        /// Application category
        category: Option<String>,
        /// Application payload
        data: Option<Value>,
    },
    /// Not routable
    Malformed(Malformed),
}

/// Classify one inbound message.
pub fn classify(raw: &RawInbound) -> InboundEvent {
    let text = match raw {
        RawInbound::Message(text) => text,
        RawInbound::ErrorStanza { text } => {
            return InboundEvent::Malformed(Malformed::ErrorStanza { text: text.clone() });
        },
    };

    let msg = match InboundMessage::from_json(text) {
        Ok(Some(msg)) => msg,
        Ok(None) => return InboundEvent::Malformed(Malformed::MissingMessageId),
        Err(e) => return InboundEvent::Malformed(Malformed::Undecodable(e.to_string())),
    };

    let Some(message_id) = msg.message_id.clone().filter(|id| !id.is_empty()) else {
        return InboundEvent::Malformed(Malformed::MissingMessageId);
    };

    let sender = msg.sender().map(str::to_string);

    match msg.kind() {
        Some(MessageType::Control) => {
            let signal = match msg.control_type {
                Some(ref t) if t == CONTROL_CONNECTION_DRAINING => {
                    ControlSignal::ConnectionDraining
                },
                other => ControlSignal::Other(other),
            };
            InboundEvent::Control { message_id, signal }
        },
        Some(MessageType::Ack) => InboundEvent::Ack { message_id, from: msg.from },
        Some(MessageType::Nack) => InboundEvent::Nack {
            message_id,
            from: msg.from,
            error: msg.error,
            description: msg.error_description,
        },
        Some(MessageType::Receipt) => InboundEvent::Receipt {
            message_id,
            from: msg.from,
            category: msg.category,
            data: msg.data,
        },
        None => match sender {
            Some(from) => InboundEvent::Upstream {
                message_id,
                from,
                category: msg.category,
                data: msg.data,
            },
            None => InboundEvent::Malformed(Malformed::MissingSender { message_id }),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(value: &Value) -> RawInbound {
        RawInbound::Message(value.to_string())
    }

    #[test]
    fn draining_control() {
        let event = classify(&raw(&json!({
            "message_type": "control",
            "control_type": "CONNECTION_DRAINING",
            "message_id": "c1",
        })));
        assert_eq!(event, InboundEvent::Control {
            message_id: MessageId::new("c1"),
            signal: ControlSignal::ConnectionDraining,
        });
    }

    #[test]
    fn unknown_control_type() {
        let event = classify(&raw(&json!({
            "message_type": "control",
            "control_type": "SOMETHING_NEW",
            "message_id": "c2",
        })));
        assert!(matches!(event, InboundEvent::Control {
            signal: ControlSignal::Other(Some(_)),
            ..
        }));
    }

    #[test]
    fn nack_carries_error() {
        let event = classify(&raw(&json!({
            "message_type": "nack",
            "message_id": "m1",
            "from": "tok",
            "error": "BAD_REGISTRATION",
        })));
        assert_eq!(event, InboundEvent::Nack {
            message_id: MessageId::new("m1"),
            from: Some("tok".into()),
            error: Some("BAD_REGISTRATION".into()),
            description: None,
        });
    }

    #[test]
    fn upstream_with_any_unknown_type() {
        for message_type in [json!("upstream"), json!("something_else"), Value::Null] {
            let event = classify(&raw(&json!({
                "message_type": message_type,
                "message_id": 123,
                "from": "somebody",
                "data": {"sweet": "bike"},
            })));
            assert_eq!(event, InboundEvent::Upstream {
                message_id: MessageId::new("123"),
                from: "somebody".into(),
                category: None,
                data: Some(json!({"sweet": "bike"})),
            });
        }
    }

    #[test]
    fn upstream_without_sender_is_malformed() {
        let event = classify(&raw(&json!({"message_id": "u1", "from": ""})));
        assert_eq!(
            event,
            InboundEvent::Malformed(Malformed::MissingSender { message_id: MessageId::new("u1") })
        );
    }

    #[test]
    fn missing_or_empty_id_is_malformed() {
        for body in [json!({}), json!({"message_id": ""}), Value::Null] {
            assert_eq!(
                classify(&raw(&body)),
                InboundEvent::Malformed(Malformed::MissingMessageId)
            );
        }
    }

    #[test]
    fn garbage_is_undecodable() {
        let event = classify(&RawInbound::Message("<<<".into()));
        assert!(matches!(event, InboundEvent::Malformed(Malformed::Undecodable(_))));
    }

    #[test]
    fn error_stanza_keeps_text() {
        let event = classify(&RawInbound::ErrorStanza { text: Some("InvalidJson".into()) });
        assert_eq!(
            event,
            InboundEvent::Malformed(Malformed::ErrorStanza { text: Some("InvalidJson".into()) })
        );
    }
}
