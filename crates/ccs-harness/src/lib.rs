//! Deterministic simulation harness for CCS session testing.
//!
//! Seeded implementations of the environment and a scripted server peer, so
//! every scenario replays identically from its seed.
//!
//! # Layers
//!
//! - [`SimDriver`] drives a [`ccs_core::Session`] synchronously against a
//!   [`SimServer`], for core-level scenario and property tests
//! - [`SimTransport`] sits on the transport side of a
//!   [`ccs_client::Client`], for async facade tests
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after every
//! step. Use [`InvariantRegistry::standard()`] for the window and lifecycle
//! invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_server;
pub mod sim_transport;

pub use invariants::{
    CapacityBounded, Invariant, InvariantRegistry, InvariantResult, NoIdleSlotWithBacklog,
    ShutdownDrained, UniqueOutstanding, Violation, WindowBound,
};
pub use sim_driver::SimDriver;
pub use sim_env::{SimEnv, SimInstant};
pub use sim_server::{SharedSimServer, SimServer};
pub use sim_transport::{AckPolicy, SimTransport};
