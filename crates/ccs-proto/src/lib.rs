//! Protocol
//!
//! Wire types for the CCS push-notification protocol: the JSON bodies carried
//! inside each protocol message in both directions.
//!
//! Stream framing, TLS and the authentication handshake belong to the
//! transport. This crate only describes the JSON that the transport carries:
//!
//! - [`RawInbound`]: what the transport hands over for each received message
//! - [`InboundMessage`]: the decoded JSON body of a server message
//! - [`Envelope`]: an outbound body, either a downstream notification or the
//!   acknowledgement of an upstream message
//!
//! # Invariants
//!
//! - A serialized [`OutboundMessage`] always carries exactly one `to` and one
//!   `message_id`. [`SendOptions`] refuses extra keys that would shadow them.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod errors;
mod inbound;
mod message_id;
mod outbound;

pub use errors::{ProtocolError, Result};
pub use inbound::{InboundMessage, MessageType, RawInbound};
pub use message_id::MessageId;
pub use outbound::{Envelope, OutboundMessage, Priority, SendOptions, UpstreamAck};

/// Maximum number of unacknowledged downstream messages allowed per
/// connection.
pub const ACK_WINDOW: usize = 100;

/// `control_type` announcing that the server will close the connection soon.
pub const CONTROL_CONNECTION_DRAINING: &str = "CONNECTION_DRAINING";

/// Default CCS host.
pub const DEFAULT_HOST: &str = "gcm.googleapis.com";

/// Default CCS port (TLS from the first byte).
pub const DEFAULT_PORT: u16 = 5235;

/// Domain appended to the sender id to form the login JID.
pub const JID_DOMAIN: &str = "gcm.googleapis.com";
