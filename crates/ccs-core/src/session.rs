//! Session: the composed delivery engine.
//!
//! Owns the delivery window (and through it the ack table) and the
//! connection state machine. Each method consumes one input (a caller
//! request or a transport event) and returns [`SessionAction`]s for the
//! driver to execute in order. Because all mutable state sits behind one
//! `&mut self`, wrapping the session in a single lock is enough to keep
//! admission atomic with respect to occupancy.
//!
//! # Delivery flow
//!
//! ```text
//! send ──> backlog ──(Online, slot free)──> pending ──> Send(envelope)
//!                                              │
//!            ack / nack / deadline ────────────┘──> completion fires,
//!                                                   slot refilled FIFO
//! ```

use std::time::Duration;

use ccs_proto::{ACK_WINDOW, Envelope, MessageId, OutboundMessage, RawInbound, SendOptions, UpstreamAck};
use serde_json::Value;

use crate::{
    ack_tracker::{AckResult, Completion, Delivered},
    connection::{CloseOutcome, Connection, ConnectionState},
    env::Environment,
    error::{DeliveryError, SessionError},
    router::{ControlSignal, InboundEvent, Malformed, classify},
    window::DeliveryWindow,
};

/// Nack code used when the server omits one.
pub const UNKNOWN_NACK_CODE: &str = "UNKNOWN";

/// Attempts at drawing an identifier that is not already outstanding.
const MAX_ID_ATTEMPTS: usize = 16;

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum unacknowledged messages on the wire (at most
    /// [`ACK_WINDOW`])
    pub capacity: usize,
    /// Fail a pending message if no ack or nack arrives within this long.
    /// `None` waits forever.
    pub ack_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { capacity: ACK_WINDOW, ack_timeout: None }
    }
}

impl SessionConfig {
    /// Override the window capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Enable the per-message acknowledgement deadline.
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = Some(timeout);
        self
    }
}

/// Externally observable session events.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Transport connection is up
    Connected,
    /// Transport connection is gone and will not be re-established
    /// automatically
    Disconnected,
    /// Transport reported an error
    Error {
        /// Error description
        reason: String,
    },
    /// Delivery receipt
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
    /// Upstream message from a device
    Message {
        /// Identifier of the upstream message
        message_id: MessageId,
        /// Device that sent it
        from: String,
        /// Application category
        category: Option<String>,
        /// Application payload
        data: Value,
    },
    /// Transport-level error message
    MessageError {
        /// Error text, if any
        text: Option<String>,
    },
}

/// Actions returned by the session.
///
/// The driver executes these in order:
/// - `Connect`: open a transport connection
/// - `Send`: serialize and write the envelope
/// - `Disconnect`: close the transport connection
/// - `Notify`: publish the notification to the application
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Open a transport connection
    Connect,
    /// Put this envelope on the wire
    Send(Envelope),
    /// Close the transport connection
    Disconnect,
    /// Publish a notification
    Notify(Notification),
}

/// Point-in-time view of the session, for invariant checks and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Connection state
    pub state: ConnectionState,
    /// Messages on the wire awaiting ack or nack
    pub occupied: usize,
    /// Messages waiting for a slot
    pub backlog: usize,
    /// Window capacity
    pub capacity: usize,
    /// Graceful close requested
    pub closing: bool,
    /// Identifiers on the wire then held, each oldest first
    pub outstanding: Vec<MessageId>,
}

/// Delivery session state machine.
///
/// Generic over the environment (time, randomness) and over the completion
/// handle each caller waits on.
pub struct Session<E: Environment, C: Completion> {
    env: E,
    config: SessionConfig,
    connection: Connection,
    window: DeliveryWindow<C, E::Instant>,
}

impl<E: Environment, C: Completion> Session<E, C> {
    /// Create a new session in [`ConnectionState::Idle`].
    pub fn new(env: E, config: SessionConfig) -> Self {
        let window = DeliveryWindow::new(config.capacity);
        Self { env, config, connection: Connection::new(), window }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// True iff every slot of the window is taken.
    ///
    /// Informational only: `send` always accepts.
    pub fn is_saturated(&self) -> bool {
        self.window.is_saturated()
    }

    /// Current occupancy and state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.connection.state(),
            occupied: self.window.occupied(),
            backlog: self.window.backlog_len(),
            capacity: self.window.capacity(),
            closing: self.connection.is_closing(),
            outstanding: self
                .window
                .pending()
                .chain(self.window.held())
                .map(|message| message.message_id.clone())
                .collect(),
        }
    }

    /// Request a transport connection.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` unless `Idle` or `Disconnected`
    pub fn connect(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        self.connection.connect()?;
        tracing::info!("connecting");
        Ok(vec![SessionAction::Connect])
    }

    /// Transport connection is up.
    ///
    /// Retransmits every pending message with its original identifier, then
    /// admits held messages into free slots.
    pub fn on_transport_online(&mut self) -> Vec<SessionAction> {
        if let Err(e) = self.connection.on_online() {
            tracing::warn!(error = %e, "ignoring transport online event");
            return Vec::new();
        }

        let now = self.env.now();
        let resent = self.window.retransmit(now);
        let admitted = self.window.fill(now);
        tracing::info!(retransmitted = resent.len(), admitted = admitted.len(), "online");

        let mut actions = vec![SessionAction::Notify(Notification::Connected)];
        actions.extend(resent.into_iter().chain(admitted).map(downstream));
        actions
    }

    /// Transport connection is gone.
    pub fn on_transport_closed(&mut self) -> Vec<SessionAction> {
        match self.connection.on_closed() {
            CloseOutcome::Reconnect => {
                tracing::info!(pending = self.window.occupied(), "connection drained, reconnecting");
                vec![SessionAction::Connect]
            },
            CloseOutcome::Disconnected => {
                tracing::warn!(
                    pending = self.window.occupied(),
                    backlog = self.window.backlog_len(),
                    "connection lost"
                );
                vec![SessionAction::Notify(Notification::Disconnected)]
            },
            CloseOutcome::Finished => {
                tracing::info!("connection closed");
                vec![SessionAction::Notify(Notification::Disconnected)]
            },
            CloseOutcome::Ignored => {
                tracing::debug!(state = ?self.connection.state(), "ignoring transport close");
                Vec::new()
            },
        }
    }

    /// Transport reported an error.
    ///
    /// Always surfaced as [`Notification::Error`]. Only an error before the
    /// first successful connection ends the attempt.
    pub fn on_transport_error(&mut self, reason: impl Into<String>) -> Vec<SessionAction> {
        let reason = reason.into();
        tracing::warn!(%reason, "transport error");

        let mut actions = vec![SessionAction::Notify(Notification::Error { reason })];
        if self.connection.on_error() {
            actions.push(SessionAction::Disconnect);
            actions.push(SessionAction::Notify(Notification::Disconnected));
        }
        actions
    }

    /// Queue a downstream message.
    ///
    /// Never blocks and always accepts: the message goes on the wire now if
    /// the session is `Online` and a slot is free, otherwise it is held. The
    /// outcome arrives through `completion`. After shutdown the completion
    /// fails immediately with `DeliveryError::Shutdown`.
    ///
    /// # Errors
    ///
    /// - `SessionError::DuplicateMessageId` if no unused identifier could be
    ///   drawn from the environment; `completion` is dropped unfired
    pub fn send(
        &mut self,
        to: impl Into<String>,
        data: Option<Value>,
        options: SendOptions,
        completion: C,
    ) -> Result<(MessageId, Vec<SessionAction>), SessionError> {
        let message_id = self.fresh_message_id();

        if self.connection.state() == ConnectionState::Shutdown {
            tracing::debug!(%message_id, "send after shutdown");
            completion.complete(Err(DeliveryError::Shutdown { message_id: message_id.clone() }));
            return Ok((message_id, Vec::new()));
        }

        let message = OutboundMessage { to: to.into(), message_id: message_id.clone(), data, options };
        let admitting = self.connection.is_admitting();
        let sent = self.window.admit(message, completion, admitting, self.env.now())?;

        tracing::debug!(
            %message_id,
            sent = sent.len(),
            occupied = self.window.occupied(),
            backlog = self.window.backlog_len(),
            "queued"
        );

        Ok((message_id, sent.into_iter().map(downstream).collect()))
    }

    /// Process one inbound message.
    ///
    /// Never fails: malformed input is logged and dropped.
    pub fn on_inbound(&mut self, raw: &RawInbound) -> Vec<SessionAction> {
        match classify(raw) {
            InboundEvent::Control { message_id, signal: ControlSignal::ConnectionDraining } => {
                if self.connection.on_draining() {
                    tracing::info!(%message_id, "server is draining the connection");
                } else {
                    tracing::debug!(state = ?self.connection.state(), "ignoring draining signal");
                }
                Vec::new()
            },
            InboundEvent::Control { message_id, signal: ControlSignal::Other(control_type) } => {
                tracing::debug!(%message_id, ?control_type, "ignoring control message");
                Vec::new()
            },
            InboundEvent::Ack { message_id, from } => {
                let outcome = Ok(Delivered { message_id: message_id.clone(), from });
                self.release(&message_id, outcome)
            },
            InboundEvent::Nack { message_id, from, error, description } => {
                let code = error.unwrap_or_else(|| UNKNOWN_NACK_CODE.to_string());
                tracing::debug!(%message_id, %code, "nack");
                let outcome = Err(DeliveryError::Nack {
                    code,
                    message_id: message_id.clone(),
                    from,
                    description,
                });
                self.release(&message_id, outcome)
            },
            InboundEvent::Receipt { message_id, from, category, data } => {
                vec![SessionAction::Notify(Notification::Receipt {
                    message_id,
                    from,
                    category,
                    data,
                })]
            },
            InboundEvent::Upstream { message_id, from, category, data } => {
                self.handle_upstream(message_id, from, category, data)
            },
            InboundEvent::Malformed(Malformed::ErrorStanza { text }) => {
                tracing::warn!(?text, "error message from server");
                vec![SessionAction::Notify(Notification::MessageError { text })]
            },
            InboundEvent::Malformed(reason) => {
                tracing::debug!(?reason, "discarding inbound message");
                Vec::new()
            },
        }
    }

    /// Periodic maintenance: enforce the acknowledgement deadline.
    pub fn tick(&mut self, now: E::Instant) -> Vec<SessionAction> {
        let Some(timeout) = self.config.ack_timeout else {
            return Vec::new();
        };

        let expired = self.window.expire(now, timeout);
        if expired.is_empty() {
            return Vec::new();
        }
        tracing::warn!(count = expired.len(), ?timeout, "acknowledgement deadline passed");

        let mut actions: Vec<_> = if self.connection.is_admitting() {
            self.window.fill(now).into_iter().map(downstream).collect()
        } else {
            Vec::new()
        };
        actions.extend(self.finish_close_if_idle());
        actions
    }

    /// Graceful shutdown.
    ///
    /// Closes the transport once every pending message has resolved. Held
    /// messages still go out while slots free up and the session is online;
    /// whatever is still held when the last pending message resolves fails
    /// with `DeliveryError::Shutdown`.
    pub fn end(&mut self) -> Vec<SessionAction> {
        if let Err(e) = self.connection.begin_close() {
            tracing::debug!(error = %e, "ignoring end");
            return Vec::new();
        }
        tracing::info!(pending = self.window.occupied(), "graceful close requested");
        self.finish_close_if_idle()
    }

    /// Forced shutdown: fail every pending and held message and close the
    /// transport now.
    pub fn destroy(&mut self) -> Vec<SessionAction> {
        let failed = self.window.reject_all(shutdown_error);
        let had_transport = self.connection.shutdown();
        tracing::info!(failed, "session destroyed");

        if had_transport { vec![SessionAction::Disconnect] } else { Vec::new() }
    }

    fn handle_upstream(
        &mut self,
        message_id: MessageId,
        from: String,
        category: Option<String>,
        data: Option<Value>,
    ) -> Vec<SessionAction> {
        let mut actions = Vec::new();

        if self.connection.is_connected() {
            let ack = UpstreamAck::new(from.clone(), message_id.clone());
            actions.push(SessionAction::Send(Envelope::Ack(ack)));
        } else {
            tracing::warn!(%message_id, "upstream message while disconnected, not acked");
        }

        if let Some(data) = data {
            actions.push(SessionAction::Notify(Notification::Message {
                message_id,
                from,
                category,
                data,
            }));
        }
        actions
    }

    fn release(&mut self, message_id: &MessageId, outcome: AckResult) -> Vec<SessionAction> {
        let admitting = self.connection.is_admitting();
        let Some(sent) = self.window.release(message_id, outcome, admitting, self.env.now()) else {
            tracing::debug!(%message_id, "acknowledgement for unknown message id");
            return Vec::new();
        };

        let mut actions: Vec<_> = sent.into_iter().map(downstream).collect();
        actions.extend(self.finish_close_if_idle());
        actions
    }

    fn finish_close_if_idle(&mut self) -> Vec<SessionAction> {
        if !self.connection.is_closing()
            || !self.window.is_idle()
            || self.connection.state() == ConnectionState::Shutdown
        {
            return Vec::new();
        }

        let abandoned = self.window.reject_backlog(shutdown_error);
        if abandoned > 0 {
            tracing::warn!(abandoned, "closing with messages still held");
        }

        if self.connection.shutdown() { vec![SessionAction::Disconnect] } else { Vec::new() }
    }

    fn fresh_message_id(&self) -> MessageId {
        let mut message_id = self.env.message_id();
        for _ in 1..MAX_ID_ATTEMPTS {
            if !self.window.contains(&message_id) {
                break;
            }
            message_id = self.env.message_id();
        }
        message_id
    }
}

fn downstream(message: OutboundMessage) -> SessionAction {
    SessionAction::Send(Envelope::Downstream(message))
}

fn shutdown_error(message_id: &MessageId) -> DeliveryError {
    DeliveryError::Shutdown { message_id: message_id.clone() }
}
