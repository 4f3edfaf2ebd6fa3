//! Protocol errors.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while decoding or encoding protocol JSON.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Inbound body is not valid JSON or has the wrong shape
    #[error("decode error: {0}")]
    Decode(String),

    /// Outbound body could not be serialized
    #[error("encode error: {0}")]
    Encode(String),

    /// Option key collides with a field the envelope owns
    #[error("option {0:?} is reserved by the envelope")]
    ReservedOption(String),
}
