//! CCS client.
//!
//! Async facade over the sans-IO [`ccs_core::Session`]. The facade owns no
//! sockets: it talks to an XMPP transport through a pair of channels
//! ([`TransportHandle`]), so any transport (or a simulated peer in tests)
//! can sit on the other side.
//!
//! ```ignore
//! let config = ClientConfig::new("123456789", api_key);
//! let (client, transport, mut events) = Client::start(config, SystemEnv::new());
//! tokio::spawn(run_xmpp(transport));
//!
//! client.connect()?;
//! let delivered = client.send("device-token", Some(json!({"hello": "world"})), SendOptions::new())?.await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod config;
mod error;
mod event;
mod system_env;
mod transport;

pub use ccs_core::{AckResult, ConnectionState, Delivered, DeliveryError, SessionConfig};
pub use ccs_proto::{MessageId, Priority, SendOptions};
pub use client::{Client, PendingDelivery};
pub use config::{ClientConfig, Endpoint};
pub use error::ClientError;
pub use event::{ClientEvent, Events};
pub use system_env::SystemEnv;
pub use transport::{
    ConnectParams, EventSender, TransportCommand, TransportError, TransportEvent, TransportHandle,
};
