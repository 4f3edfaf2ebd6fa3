//! Outbound (client to server) messages.
//!
//! Two bodies exist: a downstream notification ([`OutboundMessage`]) that the
//! server acks or nacks, and the acknowledgement the client owes for every
//! upstream message ([`UpstreamAck`]), which is fire-and-forget.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{MessageId, MessageType, ProtocolError, Result};

/// Keys an option may never use: the envelope owns them, or a typed field of
/// [`SendOptions`] already serializes under that name.
const RESERVED_KEYS: &[&str] = &[
    "to",
    "message_id",
    "data",
    "message_type",
    "priority",
    "time_to_live",
    "collapse_key",
    "delay_while_idle",
    "delivery_receipt_requested",
    "content_available",
    "dry_run",
];

/// Delivery priority of a downstream message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// May be delayed to save battery
    Normal,
    /// Delivered immediately, may wake the device
    High,
}

/// Protocol-level options attached to a downstream message.
///
/// Typed fields cover the common options; anything else goes through
/// [`SendOptions::with_extra`] and is flattened into the envelope as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SendOptions {
    /// Delivery priority
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Seconds the server keeps the message while the device is offline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<u32>,
    /// Messages sharing a collapse key replace each other while queued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    /// Hold the message until the device becomes active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_while_idle: Option<bool>,
    /// Ask the server for a delivery receipt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_receipt_requested: Option<bool>,
    /// Wake an inactive client app (iOS)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_available: Option<bool>,
    /// Validate without delivering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl SendOptions {
    /// Options with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delivery priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the time to live in seconds.
    #[must_use]
    pub fn with_time_to_live(mut self, seconds: u32) -> Self {
        self.time_to_live = Some(seconds);
        self
    }

    /// Set the collapse key.
    #[must_use]
    pub fn with_collapse_key(mut self, key: impl Into<String>) -> Self {
        self.collapse_key = Some(key.into());
        self
    }

    /// Request a delivery receipt for this message.
    #[must_use]
    pub fn with_delivery_receipt(mut self) -> Self {
        self.delivery_receipt_requested = Some(true);
        self
    }

    /// Mark the message as a dry run.
    #[must_use]
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = Some(true);
        self
    }

    /// Add an untyped option.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::ReservedOption` if `key` is owned by the envelope or
    ///   by a typed option
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Result<Self> {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(ProtocolError::ReservedOption(key));
        }
        self.extra.insert(key, value);
        Ok(self)
    }

    /// Untyped options added with [`SendOptions::with_extra`].
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

/// A downstream notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    /// Registration token or topic of the recipient
    pub to: String,
    /// Identifier the server echoes in its ack or nack
    pub message_id: MessageId,
    /// Application payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Protocol options, flattened into the body
    #[serde(flatten)]
    pub options: SendOptions,
}

/// Acknowledgement of an upstream message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamAck {
    /// Device that sent the upstream message
    pub to: String,
    /// Identifier of the upstream message
    pub message_id: MessageId,
    message_type: MessageType,
}

impl UpstreamAck {
    /// Ack for the upstream message `message_id` from `to`.
    pub fn new(to: impl Into<String>, message_id: MessageId) -> Self {
        Self { to: to.into(), message_id, message_type: MessageType::Ack }
    }
}

/// Any JSON body the client puts on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    /// Notification awaiting an ack or nack
    Downstream(OutboundMessage),
    /// Acknowledgement of an upstream message
    Ack(UpstreamAck),
}

impl Envelope {
    /// Identifier carried by the body.
    pub fn message_id(&self) -> &MessageId {
        match self {
            Self::Downstream(message) => &message.message_id,
            Self::Ack(ack) => &ack.message_id,
        }
    }

    /// Recipient address.
    pub fn to(&self) -> &str {
        match self {
            Self::Downstream(message) => &message.to,
            Self::Ack(ack) => &ack.to,
        }
    }

    /// True for upstream acknowledgements.
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack(_))
    }

    /// Serialize the body to JSON text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}
