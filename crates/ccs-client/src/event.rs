//! Session events for the application.

use tokio::sync::mpsc;

/// Events published by the client.
///
/// `Connected`, `Disconnected`, `Error`, `Receipt`, `Message` and
/// `MessageError`.
pub type ClientEvent = ccs_core::Notification;

/// Stream of [`ClientEvent`]s, in the order the session produced them.
///
/// Events are buffered without bound; a consumer that never reads only costs
/// memory.
#[derive(Debug)]
pub struct Events {
    rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Events {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ClientEvent>) -> Self {
        Self { rx }
    }

    /// Next event. `None` once every [`crate::Client`] handle and the driver
    /// are gone.
    pub async fn next(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_next(&mut self) -> Option<ClientEvent> {
        self.rx.try_recv().ok()
    }
}
