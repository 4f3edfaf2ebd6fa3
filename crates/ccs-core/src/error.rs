//! Error types for the delivery core.
//!
//! Two layers: [`SessionError`] for requests the session refuses (illegal
//! state transitions, identifier collisions), and [`DeliveryError`] for the
//! failure of a single message, which always travels through that message's
//! own completion and is never raised out of the session.

use std::time::Duration;

use ccs_proto::MessageId;
use thiserror::Error;

use crate::connection::ConnectionState;

/// Nack codes after which resending the same message may succeed.
const RETRYABLE_NACK_CODES: &[&str] = &[
    "SERVICE_UNAVAILABLE",
    "INTERNAL_SERVER_ERROR",
    "DEVICE_MESSAGE_RATE_EXCEEDED",
    "CONNECTION_DRAINING",
];

/// Errors that can occur during session state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Identifier is already outstanding
    #[error("message id {0} is already outstanding")]
    DuplicateMessageId(MessageId),
}

/// Failure of one downstream message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Server refused the message
    #[error("nack {code} for {message_id}")]
    Nack {
        /// Server error code (e.g. `BAD_REGISTRATION`)
        code: String,
        /// Message the nack refers to
        message_id: MessageId,
        /// Recipient the server reported, if any
        from: Option<String>,
        /// Free-form detail from the server
        description: Option<String>,
    },

    /// Session was destroyed (or closed with the message still held)
    #[error("session shut down before {message_id} was acknowledged")]
    Shutdown {
        /// Message that was abandoned
        message_id: MessageId,
    },

    /// No ack or nack arrived within the configured deadline
    #[error("no acknowledgement for {message_id} after {elapsed:?}")]
    Timeout {
        /// Message that timed out
        message_id: MessageId,
        /// Time since the message was put on the wire
        elapsed: Duration,
    },
}

impl DeliveryError {
    /// Identifier of the failed message.
    pub fn message_id(&self) -> &MessageId {
        match self {
            Self::Nack { message_id, .. }
            | Self::Shutdown { message_id }
            | Self::Timeout { message_id, .. } => message_id,
        }
    }

    /// Returns true if sending the message again may succeed.
    ///
    /// Timeouts and server-side transient nacks are retryable. Nacks about
    /// the message or recipient itself (bad token, payload too large) and
    /// shutdowns are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Nack { code, .. } => RETRYABLE_NACK_CODES.contains(&code.as_str()),
            Self::Timeout { .. } => true,
            Self::Shutdown { .. } => false,
        }
    }
}
