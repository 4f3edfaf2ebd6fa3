//! Inbound (server to client) messages.

use serde::{Deserialize, Serialize};

use crate::{MessageId, ProtocolError, Result};

/// A message as delivered by the transport, before JSON decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInbound {
    /// Regular protocol message; holds the embedded JSON text.
    Message(String),

    /// Transport-level error message.
    ErrorStanza {
        /// Human readable error text, if the server sent any.
        text: Option<String>,
    },
}

/// `message_type` values with protocol-defined meaning.
///
/// Anything else (including an absent type) is an upstream message from a
/// device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Server control signal
    Control,
    /// Positive acknowledgement
    Ack,
    /// Negative acknowledgement
    Nack,
    /// Delivery receipt
    Receipt,
}

impl MessageType {
    /// Parse a wire `message_type`. `None` for unknown types.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "control" => Some(Self::Control),
            "ack" => Some(Self::Ack),
            "nack" => Some(Self::Nack),
            "receipt" => Some(Self::Receipt),
            _ => None,
        }
    }

    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Ack => "ack",
            Self::Nack => "nack",
            Self::Receipt => "receipt",
        }
    }
}

/// Decoded JSON body of a server message.
///
/// Every field is optional on the wire; classification decides which ones a
/// given message must carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Identifier the message refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    /// Protocol message type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    /// Control signal carried by `control` messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_type: Option<String>,
    /// Error code carried by `nack` messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Free-form error detail carried by `nack` messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// Device token or sender address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Application category (package name) of an upstream message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Application payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl InboundMessage {
    /// Decode a message body.
    ///
    /// A literal JSON `null` decodes to `Ok(None)`.
    pub fn from_json(text: &str) -> Result<Option<Self>> {
        serde_json::from_str::<Option<Self>>(text).map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    /// Known message type, if any.
    pub fn kind(&self) -> Option<MessageType> {
        self.message_type.as_deref().and_then(MessageType::parse)
    }

    /// Sender address, ignoring empty strings.
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref().filter(|from| !from.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_nack() {
        let text = r#"{"message_type":"nack","message_id":"abc","from":"tok","error":"BAD_REGISTRATION","error_description":"gone"}"#;
        let msg = InboundMessage::from_json(text).unwrap().unwrap();

        assert_eq!(msg.kind(), Some(MessageType::Nack));
        assert_eq!(msg.message_id, Some(MessageId::new("abc")));
        assert_eq!(msg.error.as_deref(), Some("BAD_REGISTRATION"));
        assert_eq!(msg.error_description.as_deref(), Some("gone"));
        assert_eq!(msg.sender(), Some("tok"));
    }

    #[test]
    fn null_body_is_none() {
        assert_eq!(InboundMessage::from_json("null").unwrap(), None);
    }

    #[test]
    fn garbage_is_decode_error() {
        assert!(matches!(InboundMessage::from_json("{not json"), Err(ProtocolError::Decode(_))));
        assert!(matches!(InboundMessage::from_json("42"), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let text = r#"{"message_id":"1","time_to_live":3,"from":"dev"}"#;
        let msg = InboundMessage::from_json(text).unwrap().unwrap();
        assert_eq!(msg.kind(), None);
        assert_eq!(msg.sender(), Some("dev"));
    }

    #[test]
    fn upstream_type_is_not_a_known_kind() {
        let msg = InboundMessage {
            message_type: Some("upstream".into()),
            data: Some(json!({"sweet": "bike"})),
            ..Default::default()
        };
        assert_eq!(msg.kind(), None);
    }

    #[test]
    fn empty_sender_is_absent() {
        let msg = InboundMessage { from: Some(String::new()), ..Default::default() };
        assert_eq!(msg.sender(), None);
    }
}
