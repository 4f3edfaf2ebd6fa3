//! Client configuration.

use std::{fmt, time::Duration};

use ccs_core::SessionConfig;
use ccs_proto::{DEFAULT_HOST, DEFAULT_PORT, JID_DOMAIN};

use crate::transport::ConnectParams;

/// TCP keep-alive interval for the XMPP stream.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(10);

/// Where the CCS server lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Server host name
    pub host: String,
    /// Server port
    pub port: u16,
    /// TLS from the first byte rather than STARTTLS
    pub legacy_tls: bool,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self { host: DEFAULT_HOST.to_string(), port: DEFAULT_PORT, legacy_tls: true }
    }
}

/// Client configuration.
///
/// `api_key` is the server key used as the SASL PLAIN password. It never
/// appears in `Debug` output.
#[derive(Clone)]
pub struct ClientConfig {
    /// Project sender id
    pub sender_id: String,
    /// Server API key
    pub api_key: String,
    /// Server endpoint
    pub endpoint: Endpoint,
    /// TCP keep-alive interval
    pub keepalive: Duration,
    /// Delivery window and deadline settings
    pub session: SessionConfig,
}

impl ClientConfig {
    /// Configuration for the production endpoint.
    pub fn new(sender_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            api_key: api_key.into(),
            endpoint: Endpoint::default(),
            keepalive: DEFAULT_KEEPALIVE,
            session: SessionConfig::default(),
        }
    }

    /// Connect somewhere other than the production endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Override the keep-alive interval.
    #[must_use]
    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Override the session settings.
    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// XMPP identity: `<sender_id>@gcm.googleapis.com`.
    pub fn jid(&self) -> String {
        format!("{}@{JID_DOMAIN}", self.sender_id)
    }

    /// Parameters handed to the transport on every connect.
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            jid: self.jid(),
            password: self.api_key.clone(),
            host: self.endpoint.host.clone(),
            port: self.endpoint.port,
            legacy_tls: self.endpoint.legacy_tls,
            keepalive: self.keepalive,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("sender_id", &self.sender_id)
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("keepalive", &self.keepalive)
            .field("session", &self.session)
            .finish()
    }
}
