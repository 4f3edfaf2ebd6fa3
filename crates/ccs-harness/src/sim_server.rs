//! Scripted CCS server peer.
//!
//! `SimServer` records every envelope a session puts on the wire and builds
//! the inbound messages a real server would answer with. Tests decide when
//! (and whether) each answer is delivered, which is how reordering, lost acks
//! and draining are simulated.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use ccs_client::ConnectParams;
use ccs_proto::{
    CONTROL_CONNECTION_DRAINING, Envelope, MessageId, OutboundMessage, RawInbound, UpstreamAck,
};
use serde_json::{Value, json};

/// Server shared between a [`crate::SimTransport`] task and the test.
pub type SharedSimServer = Arc<Mutex<SimServer>>;

/// Simulated CCS endpoint.
#[derive(Debug, Default)]
pub struct SimServer {
    /// Every envelope received, in wire order
    received: Vec<Envelope>,
    /// Downstream ids received and not yet answered, in first-seen order
    unanswered: Vec<MessageId>,
    /// Times each downstream id was received
    deliveries: HashMap<MessageId, usize>,
    /// Parameters of every connect
    connects: Vec<ConnectParams>,
    /// Number of disconnects
    disconnects: usize,
}

impl SimServer {
    /// Fresh server with nothing received.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh server wrapped for sharing.
    pub fn shared() -> SharedSimServer {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Record one envelope from the session.
    pub fn receive(&mut self, envelope: &Envelope) {
        if let Envelope::Downstream(message) = envelope {
            let count = self.deliveries.entry(message.message_id.clone()).or_insert(0);
            if *count == 0 {
                self.unanswered.push(message.message_id.clone());
            }
            *count += 1;
        }
        self.received.push(envelope.clone());
    }

    /// Record a connect.
    pub fn record_connect(&mut self, params: ConnectParams) {
        self.connects.push(params);
    }

    /// Record a disconnect.
    pub fn record_disconnect(&mut self) {
        self.disconnects += 1;
    }

    /// Every envelope received, in order.
    pub fn received(&self) -> &[Envelope] {
        &self.received
    }

    /// Downstream messages received, in order, retransmissions included.
    pub fn downstream(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.received.iter().filter_map(|e| match e {
            Envelope::Downstream(message) => Some(message),
            Envelope::Ack(_) => None,
        })
    }

    /// Acks the session sent for upstream messages.
    pub fn upstream_acks(&self) -> impl Iterator<Item = &UpstreamAck> {
        self.received.iter().filter_map(|e| match e {
            Envelope::Ack(ack) => Some(ack),
            Envelope::Downstream(_) => None,
        })
    }

    /// Times the given downstream id was received.
    pub fn times_received(&self, message_id: &MessageId) -> usize {
        self.deliveries.get(message_id).copied().unwrap_or(0)
    }

    /// Downstream ids received and not yet answered, oldest first.
    pub fn unanswered(&self) -> &[MessageId] {
        &self.unanswered
    }

    /// Connect parameters seen, in order.
    pub fn connects(&self) -> &[ConnectParams] {
        &self.connects
    }

    /// Number of disconnects seen.
    pub fn disconnects(&self) -> usize {
        self.disconnects
    }

    /// Ack one received message.
    pub fn ack(&mut self, message_id: &MessageId) -> RawInbound {
        let to = self.answer(message_id);
        Self::ack_message(message_id, to.as_deref())
    }

    /// Nack one received message with the given error code.
    pub fn nack(&mut self, message_id: &MessageId, code: &str) -> RawInbound {
        let to = self.answer(message_id);
        Self::nack_message(message_id, to.as_deref(), code)
    }

    /// Ack the oldest unanswered message.
    pub fn ack_oldest(&mut self) -> Option<RawInbound> {
        let message_id = self.unanswered.first()?.clone();
        Some(self.ack(&message_id))
    }

    /// Ack every unanswered message, oldest first.
    pub fn ack_all(&mut self) -> Vec<RawInbound> {
        let ids = std::mem::take(&mut self.unanswered);
        ids.iter().map(|id| Self::ack_message(id, self.recipient(id).as_deref())).collect()
    }

    /// Ack for `message_id`, whether or not it was ever received.
    pub fn ack_message(message_id: &MessageId, from: Option<&str>) -> RawInbound {
        let mut body = json!({"message_type": "ack", "message_id": message_id.as_str()});
        insert_opt(&mut body, "from", from);
        RawInbound::Message(body.to_string())
    }

    /// Nack for `message_id` with `code`.
    pub fn nack_message(message_id: &MessageId, from: Option<&str>, code: &str) -> RawInbound {
        let mut body =
            json!({"message_type": "nack", "message_id": message_id.as_str(), "error": code});
        insert_opt(&mut body, "from", from);
        RawInbound::Message(body.to_string())
    }

    /// `CONNECTION_DRAINING` control message.
    pub fn draining() -> RawInbound {
        let body = json!({
            "message_type": "control",
            "message_id": "control-draining",
            "control_type": CONTROL_CONNECTION_DRAINING,
        });
        RawInbound::Message(body.to_string())
    }

    /// Upstream message from a device.
    pub fn upstream(message_id: &str, from: &str, category: &str, data: Option<Value>) -> RawInbound {
        let mut body = json!({"message_id": message_id, "from": from, "category": category});
        if let (Some(data), Value::Object(map)) = (data, &mut body) {
            map.insert("data".into(), data);
        }
        RawInbound::Message(body.to_string())
    }

    /// Delivery receipt for a downstream message.
    pub fn receipt(message_id: &str, original: &MessageId, device: &str) -> RawInbound {
        let body = json!({
            "message_type": "receipt",
            "message_id": message_id,
            "from": "gcm.googleapis.com",
            "category": "com.example",
            "data": {
                "message_status": "MESSAGE_SENT_TO_DEVICE",
                "original_message_id": original.as_str(),
                "device_registration_id": device,
            },
        });
        RawInbound::Message(body.to_string())
    }

    fn answer(&mut self, message_id: &MessageId) -> Option<String> {
        self.unanswered.retain(|id| id != message_id);
        self.recipient(message_id)
    }

    fn recipient(&self, message_id: &MessageId) -> Option<String> {
        self.downstream().find(|m| &m.message_id == message_id).map(|m| m.to.clone())
    }
}

fn insert_opt(body: &mut Value, key: &str, value: Option<&str>) {
    if let (Some(value), Value::Object(map)) = (value, body) {
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
}

