//! Message identifiers.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, de};

/// Identifier correlating a downstream message with its ack or nack.
///
/// Locally generated identifiers are 8 random bytes, hex encoded. Identifiers
/// received from devices are taken verbatim; numeric JSON identifiers are
/// accepted and kept as their decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Number of random bytes behind a generated identifier.
    pub const RANDOM_BYTES: usize = 8;

    /// Identifier from 8 random bytes (16 lowercase hex characters).
    pub fn from_random(bytes: [u8; Self::RANDOM_BYTES]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Identifier as received on the wire.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the identifier is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl de::Visitor<'_> for IdVisitor {
            type Value = MessageId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer message id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<MessageId, E> {
                Ok(MessageId(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<MessageId, E> {
                Ok(MessageId(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<MessageId, E> {
                Ok(MessageId(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<MessageId, E> {
                Ok(MessageId(v.to_string()))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}
