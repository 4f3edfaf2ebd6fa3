//! Simulated transport for [`ccs_client::Client`] tests.
//!
//! Consumes the client's transport commands and answers them the way a
//! well-behaved CCS server would, according to an [`AckPolicy`]. Everything
//! received is recorded in a [`SharedSimServer`] the test can inspect while
//! the transport task runs.

use std::sync::PoisonError;

use ccs_client::{EventSender, TransportCommand, TransportError, TransportEvent, TransportHandle};
use ccs_proto::{Envelope, RawInbound};
use tokio::task::JoinHandle;

use crate::sim_server::{SharedSimServer, SimServer};

/// How the simulated server answers downstream messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckPolicy {
    /// Ack every message immediately
    Ack,
    /// Nack every message with this code
    Nack(String),
    /// Never answer; the test answers through [`SimTransport::inject`]
    Silent,
}

/// Transport peer backed by a [`SimServer`].
pub struct SimTransport {
    handle: TransportHandle,
    server: SharedSimServer,
    policy: AckPolicy,
}

impl SimTransport {
    /// Transport that acks everything.
    pub fn new(handle: TransportHandle) -> Self {
        Self { handle, server: SimServer::shared(), policy: AckPolicy::Ack }
    }

    /// Override the answer policy.
    #[must_use]
    pub fn with_policy(mut self, policy: AckPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Server state shared with the running task.
    pub fn server(&self) -> SharedSimServer {
        SharedSimServer::clone(&self.server)
    }

    /// Deliver an inbound message to the client.
    ///
    /// # Errors
    ///
    /// - `TransportError::ClientGone` if the client driver has stopped
    pub fn inject(&self, raw: RawInbound) -> Result<(), TransportError> {
        self.handle.emit(TransportEvent::Inbound(raw))
    }

    /// Report a transport event to the client.
    ///
    /// # Errors
    ///
    /// - `TransportError::ClientGone` if the client driver has stopped
    pub fn emit(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.handle.emit(event)
    }

    /// Event sender that stays usable after [`SimTransport::spawn`].
    pub fn injector(&self) -> EventSender {
        self.handle.event_sender()
    }

    /// Process every command queued so far without waiting.
    ///
    /// Returns the number processed.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Some(command) = self.handle.try_next_command() {
            self.process(command);
            processed += 1;
        }
        processed
    }

    /// Process commands until the client goes away.
    pub async fn run(mut self) {
        while let Some(command) = self.handle.next_command().await {
            self.process(command);
        }
        tracing::debug!("client dropped, simulated transport stopping");
    }

    /// Run on the current runtime, returning the shared server.
    pub fn spawn(self) -> (SharedSimServer, JoinHandle<()>) {
        let server = self.server();
        (server, tokio::spawn(self.run()))
    }

    fn process(&mut self, command: TransportCommand) {
        let replies = {
            let mut server = self.server.lock().unwrap_or_else(PoisonError::into_inner);
            match command {
                TransportCommand::Connect(params) => {
                    server.record_connect(params);
                    vec![TransportEvent::Online]
                },
                TransportCommand::Send(envelope) => {
                    server.receive(&envelope);
                    match (&envelope, &self.policy) {
                        (Envelope::Downstream(message), AckPolicy::Ack) => {
                            vec![TransportEvent::Inbound(server.ack(&message.message_id))]
                        },
                        (Envelope::Downstream(message), AckPolicy::Nack(code)) => {
                            vec![TransportEvent::Inbound(server.nack(&message.message_id, code))]
                        },
                        _ => Vec::new(),
                    }
                },
                TransportCommand::Disconnect => {
                    server.record_disconnect();
                    vec![TransportEvent::Closed]
                },
            }
        };

        for event in replies {
            if let Err(e) = self.handle.emit(event) {
                tracing::debug!(error = %e, "dropping reply");
            }
        }
    }
}
