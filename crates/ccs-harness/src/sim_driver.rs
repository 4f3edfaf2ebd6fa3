//! Synchronous session driver.
//!
//! `SimDriver` owns a [`Session`] and a [`SimServer`] and executes session
//! actions immediately: envelopes land on the server, notifications are
//! collected, connect and disconnect requests are counted. The transport's
//! `online` and `closed` events are never automatic; tests deliver them
//! explicitly so every interleaving is under their control.

use ccs_core::{
    Completion, Notification, Session, SessionAction, SessionConfig, SessionSnapshot,
};
use ccs_proto::{MessageId, RawInbound, SendOptions};
use serde_json::Value;

use crate::{sim_env::SimEnv, sim_server::SimServer};

/// Session plus scripted server, driven step by step.
pub struct SimDriver<C: Completion> {
    /// Session under test
    pub session: Session<SimEnv, C>,
    /// Server peer
    pub server: SimServer,
    /// Environment shared with the session
    pub env: SimEnv,
    notifications: Vec<Notification>,
    connect_requests: usize,
    disconnect_requests: usize,
}

impl<C: Completion> SimDriver<C> {
    /// Idle session over a fresh server.
    pub fn new(seed: u64, config: SessionConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        Self {
            session: Session::new(env.clone(), config),
            server: SimServer::new(),
            env,
            notifications: Vec::new(),
            connect_requests: 0,
            disconnect_requests: 0,
        }
    }

    /// Execute session actions against the simulated peer.
    pub fn execute(&mut self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::Connect => self.connect_requests += 1,
                SessionAction::Send(envelope) => self.server.receive(&envelope),
                SessionAction::Disconnect => self.disconnect_requests += 1,
                SessionAction::Notify(notification) => self.notifications.push(notification),
            }
        }
    }

    /// Connect and bring the transport online.
    ///
    /// # Panics
    ///
    /// Panics if the session cannot connect from its current state.
    #[allow(clippy::expect_used)]
    pub fn go_online(&mut self) {
        let actions = self.session.connect().expect("session can connect");
        self.execute(actions);
        self.online();
    }

    /// Deliver the transport's `online` event.
    pub fn online(&mut self) {
        let actions = self.session.on_transport_online();
        self.execute(actions);
    }

    /// Deliver the transport's `closed` event.
    pub fn closed(&mut self) {
        let actions = self.session.on_transport_closed();
        self.execute(actions);
    }

    /// Deliver a transport error.
    pub fn error(&mut self, reason: &str) {
        let actions = self.session.on_transport_error(reason);
        self.execute(actions);
    }

    /// Deliver one inbound message.
    pub fn deliver(&mut self, raw: &RawInbound) {
        let actions = self.session.on_inbound(raw);
        self.execute(actions);
    }

    /// Queue a message with `data`.
    ///
    /// # Panics
    ///
    /// Panics if the session cannot draw a fresh message id.
    #[allow(clippy::expect_used)]
    pub fn send(&mut self, to: &str, data: Option<Value>, completion: C) -> MessageId {
        let (message_id, actions) = self
            .session
            .send(to, data, SendOptions::new(), completion)
            .expect("fresh message id");
        self.execute(actions);
        message_id
    }

    /// Server acks `message_id`.
    pub fn ack(&mut self, message_id: &MessageId) {
        let raw = self.server.ack(message_id);
        self.deliver(&raw);
    }

    /// Server nacks `message_id` with `code`.
    pub fn nack(&mut self, message_id: &MessageId, code: &str) {
        let raw = self.server.nack(message_id, code);
        self.deliver(&raw);
    }

    /// Server acks everything it has not answered yet, one at a time.
    ///
    /// Returns the number of acks delivered. Messages the session sends in
    /// response are acked in the same call only if `until_quiet` is set.
    pub fn ack_all(&mut self, until_quiet: bool) -> usize {
        let mut delivered = 0;
        loop {
            let batch = self.server.ack_all();
            if batch.is_empty() {
                break;
            }
            for raw in &batch {
                self.deliver(raw);
            }
            delivered += batch.len();
            if !until_quiet {
                break;
            }
        }
        delivered
    }

    /// Server announces draining, closes, and the transport reconnects.
    pub fn drain_and_reconnect(&mut self) {
        self.deliver(&SimServer::draining());
        self.closed();
        self.online();
    }

    /// Request a graceful close.
    pub fn end(&mut self) {
        let actions = self.session.end();
        self.execute(actions);
    }

    /// Request a forced close.
    pub fn destroy(&mut self) {
        let actions = self.session.destroy();
        self.execute(actions);
    }

    /// Run deadline checks at the current virtual time.
    pub fn tick(&mut self) {
        let now = ccs_core::Environment::now(&self.env);
        let actions = self.session.tick(now);
        self.execute(actions);
    }

    /// Notifications published so far.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Take the notifications published so far.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Connect actions the session issued.
    pub fn connect_requests(&self) -> usize {
        self.connect_requests
    }

    /// Disconnect actions the session issued.
    pub fn disconnect_requests(&self) -> usize {
        self.disconnect_requests
    }

    /// Current session snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }
}
