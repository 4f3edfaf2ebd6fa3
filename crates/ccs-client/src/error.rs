//! Client errors.

use ccs_core::SessionError;
use thiserror::Error;

/// Errors returned synchronously by [`crate::Client`] methods.
///
/// Per-message failures (nack, timeout, shutdown) are not here: they
/// resolve the message's own [`crate::PendingDelivery`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Session rejected the operation in its current state
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Transport side of the channel pair was dropped
    #[error("transport is gone")]
    TransportGone,
}
