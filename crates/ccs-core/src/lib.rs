//! Core
//!
//! Sans-IO delivery engine for a CCS push-notification session. Nothing in
//! this crate performs I/O or owns a runtime: every entry point takes its
//! inputs (and the current time where it matters) and returns
//! [`SessionAction`]s for the caller to execute.
//!
//! # Components
//!
//! - [`AckTracker`]: message id to pending completion, with the original
//!   message kept for retransmission
//! - [`DeliveryWindow`]: at most [`ccs_proto::ACK_WINDOW`] unacknowledged
//!   messages on the wire, FIFO backlog for the rest
//! - [`Connection`]: session lifecycle and reconnect policy
//! - [`router`]: classification of inbound messages
//! - [`Session`]: composes the above behind one `&mut self`, which is the
//!   single synchronization point for occupancy, backlog and ack table

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod ack_tracker;
pub mod connection;
pub mod env;
pub mod error;
pub mod router;
pub mod session;
pub mod window;

pub use ack_tracker::{AckResult, AckTracker, Callback, Completion, Delivered, PendingAck};
pub use connection::{CloseOutcome, Connection, ConnectionState};
pub use env::Environment;
pub use error::{DeliveryError, SessionError};
pub use router::{ControlSignal, InboundEvent, Malformed, classify};
pub use session::{Notification, Session, SessionAction, SessionConfig, SessionSnapshot};
pub use window::DeliveryWindow;
