//! Channel boundary between the client and an XMPP transport.
//!
//! The client never touches sockets. It issues [`TransportCommand`]s and
//! consumes [`TransportEvent`]s; whatever owns the [`TransportHandle`] does
//! the TLS, SASL and stanza work. Both directions are unbounded so neither
//! side ever blocks the other.

use std::{fmt, time::Duration};

use ccs_proto::{Envelope, RawInbound};
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The client and its driver are gone
    #[error("client side of the transport channel is closed")]
    ClientGone,

    /// Envelope could not be serialized
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Everything needed to open an authenticated XMPP stream.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// XMPP identity
    pub jid: String,
    /// SASL PLAIN password (the API key)
    pub password: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// TLS from the first byte
    pub legacy_tls: bool,
    /// TCP keep-alive interval
    pub keepalive: Duration,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("jid", &self.jid)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("legacy_tls", &self.legacy_tls)
            .field("keepalive", &self.keepalive)
            .finish()
    }
}

/// Requests from the client to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    /// Open a connection
    Connect(ConnectParams),
    /// Write one envelope inside a `<gcm>` stanza
    Send(Envelope),
    /// Close the connection
    Disconnect,
}

/// Reports from the transport to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Authenticated and ready for stanzas
    Online,
    /// Connection closed
    Closed,
    /// Connection-level failure
    Error(String),
    /// One inbound stanza
    Inbound(RawInbound),
}

/// Transport side of the channel pair.
#[derive(Debug)]
pub struct TransportHandle {
    commands: mpsc::UnboundedReceiver<TransportCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportHandle {
    /// Next command. `None` once the client is gone and every command has
    /// been taken.
    pub async fn next_command(&mut self) -> Option<TransportCommand> {
        self.commands.recv().await
    }

    /// Next command if one is already queued.
    pub fn try_next_command(&mut self) -> Option<TransportCommand> {
        self.commands.try_recv().ok()
    }

    /// Report an event to the client.
    ///
    /// # Errors
    ///
    /// - `TransportError::ClientGone` if the driver has stopped
    pub fn emit(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.events.send(event).map_err(|_| TransportError::ClientGone)
    }

    /// Cloneable event sender, for a reader task that runs apart from the
    /// command loop.
    pub fn event_sender(&self) -> EventSender {
        EventSender { events: self.events.clone() }
    }

    /// Serialize an envelope for the wire.
    ///
    /// # Errors
    ///
    /// - `TransportError::Encode` if the payload cannot be represented
    pub fn encode(envelope: &Envelope) -> Result<String, TransportError> {
        envelope.to_json().map_err(|e| TransportError::Encode(e.to_string()))
    }
}

/// Sending half of the event direction.
#[derive(Debug, Clone)]
pub struct EventSender {
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSender {
    /// Report an event to the client.
    ///
    /// # Errors
    ///
    /// - `TransportError::ClientGone` if the driver has stopped
    pub fn emit(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.events.send(event).map_err(|_| TransportError::ClientGone)
    }
}

/// Client side of the channel pair.
pub(crate) struct TransportLink {
    pub(crate) commands: mpsc::UnboundedSender<TransportCommand>,
    pub(crate) events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Create a connected link/handle pair.
pub(crate) fn channel() -> (TransportLink, TransportHandle) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    (
        TransportLink { commands: command_tx, events: event_rx },
        TransportHandle { commands: command_rx, events: event_tx },
    )
}
