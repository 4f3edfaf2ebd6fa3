//! Session lifecycle state machine.
//!
//! Tracks whether the transport is connected, whether the server has asked
//! us to move to a new connection, and whether the session has been shut
//! down. Pure state: no I/O, no timers. [`crate::Session`] turns transitions
//! into transport commands.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ connect ┌────────────┐ online ┌────────┐ DRAINING ┌──────────┐
//! │ Idle │────────>│ Connecting │───────>│ Online │─────────>│ Draining │
//! └──────┘         └────────────┘        └────────┘          └──────────┘
//!                    ↑  ↑    │ closed /       │ closed             │
//!                    │  │    │ first error    ↓                    │
//!                    │  │    │         ┌──────────────┐            │
//!                    │  │    └───────> │ Disconnected │            │
//!                    │  │   connect    └──────────────┘            │
//!                    │  └───────────────────────┘                  │
//!                    └─────────────────────────────────────────────┘
//!                               closed (reconnect)
//!
//! end / destroy from any state ──> Shutdown (terminal)
//! ```

use crate::error::SessionError;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, never asked to connect
    Idle,
    /// Transport is establishing a connection
    Connecting,
    /// Connected; new messages may go on the wire
    Online,
    /// Server announced it will close this connection; still connected, but
    /// no new messages are admitted
    Draining,
    /// Connection lost unexpectedly; an explicit connect is required
    Disconnected,
    /// Shut down by end or destroy; terminal
    Shutdown,
}

/// What a transport close means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Expected close after draining; connect again right away
    Reconnect,
    /// Unexpected close; wait for an explicit connect
    Disconnected,
    /// Close completing a shutdown
    Finished,
    /// Close while already disconnected; nothing to do
    Ignored,
}

/// Connection state machine
#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    ever_online: bool,
    closing: bool,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// Create a new connection in [`ConnectionState::Idle`] state
    pub fn new() -> Self {
        Self { state: ConnectionState::Idle, ever_online: false, closing: false }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while a transport connection is up (`Online` or `Draining`).
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Online | ConnectionState::Draining)
    }

    /// True if new messages may be put on the wire.
    pub fn is_admitting(&self) -> bool {
        self.state == ConnectionState::Online
    }

    /// True once a graceful close has been requested.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// True if the session reached `Online` at least once.
    pub fn ever_online(&self) -> bool {
        self.ever_online
    }

    /// Request a connection.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` unless `Idle` or `Disconnected`
    pub fn connect(&mut self) -> Result<(), SessionError> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Disconnected => {
                self.state = ConnectionState::Connecting;
                Ok(())
            },
            state => Err(SessionError::InvalidState { state, operation: "connect" }),
        }
    }

    /// Transport reports the connection is up.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` unless `Connecting`
    pub fn on_online(&mut self) -> Result<(), SessionError> {
        if self.state != ConnectionState::Connecting {
            return Err(SessionError::InvalidState { state: self.state, operation: "go online" });
        }

        self.state = ConnectionState::Online;
        self.ever_online = true;
        Ok(())
    }

    /// Server announced connection draining.
    ///
    /// Returns `true` if this moved the machine to `Draining`; the signal is
    /// ignored in every state other than `Online`.
    pub fn on_draining(&mut self) -> bool {
        if self.state == ConnectionState::Online {
            self.state = ConnectionState::Draining;
            true
        } else {
            false
        }
    }

    /// Transport reports the connection is gone.
    pub fn on_closed(&mut self) -> CloseOutcome {
        match self.state {
            ConnectionState::Draining => {
                self.state = ConnectionState::Connecting;
                CloseOutcome::Reconnect
            },
            ConnectionState::Online | ConnectionState::Connecting => {
                self.state = ConnectionState::Disconnected;
                CloseOutcome::Disconnected
            },
            ConnectionState::Shutdown => CloseOutcome::Finished,
            ConnectionState::Idle | ConnectionState::Disconnected => CloseOutcome::Ignored,
        }
    }

    /// Transport reports an error.
    ///
    /// Returns `true` if the error ended the attempt: only an error while
    /// connecting for the very first time does. Later errors are reported
    /// but the transport's own close event decides what happens next.
    pub fn on_error(&mut self) -> bool {
        if self.state == ConnectionState::Connecting && !self.ever_online {
            self.state = ConnectionState::Disconnected;
            true
        } else {
            false
        }
    }

    /// Record that a graceful close was requested.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` if already `Shutdown`
    pub fn begin_close(&mut self) -> Result<(), SessionError> {
        if self.state == ConnectionState::Shutdown {
            return Err(SessionError::InvalidState { state: self.state, operation: "end" });
        }
        self.closing = true;
        Ok(())
    }

    /// Enter the terminal state.
    ///
    /// Returns `true` if a transport connection (or attempt) existed and must
    /// be closed.
    pub fn shutdown(&mut self) -> bool {
        let had_transport = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Online | ConnectionState::Draining
        );
        self.state = ConnectionState::Shutdown;
        had_transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online() -> Connection {
        let mut conn = Connection::new();
        conn.connect().unwrap();
        conn.on_online().unwrap();
        conn
    }

    #[test]
    fn connect_then_online() {
        let conn = online();
        assert_eq!(conn.state(), ConnectionState::Online);
        assert!(conn.is_admitting());
        assert!(conn.ever_online());
    }

    #[test]
    fn draining_close_reconnects() {
        let mut conn = online();
        assert!(conn.on_draining());
        assert!(conn.is_connected());
        assert!(!conn.is_admitting());

        assert_eq!(conn.on_closed(), CloseOutcome::Reconnect);
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn unexpected_close_disconnects() {
        let mut conn = online();
        assert_eq!(conn.on_closed(), CloseOutcome::Disconnected);
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        // Explicit reconnect is allowed afterwards.
        conn.connect().unwrap();
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn draining_ignored_unless_online() {
        let mut conn = Connection::new();
        assert!(!conn.on_draining());
        conn.connect().unwrap();
        assert!(!conn.on_draining());
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn connect_while_online_is_invalid() {
        let mut conn = online();
        assert_eq!(
            conn.connect(),
            Err(SessionError::InvalidState { state: ConnectionState::Online, operation: "connect" })
        );
    }

    #[test]
    fn shutdown_is_terminal() {
        let mut conn = online();
        assert!(conn.shutdown());
        assert!(conn.connect().is_err());
        assert!(conn.begin_close().is_err());
        assert_eq!(conn.on_closed(), CloseOutcome::Finished);
        assert_eq!(conn.state(), ConnectionState::Shutdown);
    }

    #[test]
    fn shutdown_from_idle_has_no_transport() {
        let mut conn = Connection::new();
        assert!(!conn.shutdown());
    }

    #[test]
    fn early_error_ends_first_attempt_only() {
        let mut conn = Connection::new();
        conn.connect().unwrap();
        assert!(conn.on_error());
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let mut conn = online();
        conn.on_draining();
        conn.on_closed();
        assert!(!conn.on_error());
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }
}
