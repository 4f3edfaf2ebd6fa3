//! Async client facade.
//!
//! [`Client`] wraps one [`Session`] behind a single mutex. Caller methods
//! and the driver task both lock it, run one session method, and execute
//! the returned actions before unlocking, so commands reach the transport
//! in exactly the order the session produced them. The lock is never held
//! across an `.await`.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    task::{Context, Poll},
    time::Duration,
};

use ccs_core::{
    AckResult, ConnectionState, DeliveryError, Environment, Session, SessionAction,
    SessionSnapshot,
};
use ccs_proto::{MessageId, SendOptions};
use serde_json::Value;
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
};

use crate::{
    config::ClientConfig,
    error::ClientError,
    event::{ClientEvent, Events},
    system_env::SystemEnv,
    transport::{self, ConnectParams, TransportCommand, TransportEvent, TransportHandle},
};

/// Shortest interval between deadline checks.
const MIN_TICK: Duration = Duration::from_millis(50);

type Pending = oneshot::Sender<AckResult>;

struct Shared<E: Environment> {
    session: Mutex<Session<E, Pending>>,
    commands: mpsc::UnboundedSender<TransportCommand>,
    notifications: mpsc::UnboundedSender<ClientEvent>,
    params: ConnectParams,
    runtime: Handle,
}

impl<E: Environment> Shared<E> {
    fn lock(&self) -> MutexGuard<'_, Session<E, Pending>> {
        // Session methods leave state consistent before returning; a panic
        // elsewhere while holding the guard does not invalidate it.
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply<T>(
        &self,
        f: impl FnOnce(&mut Session<E, Pending>) -> (T, Vec<SessionAction>),
    ) -> T {
        let mut session = self.lock();
        let (value, actions) = f(&mut session);
        self.execute(actions);
        value
    }

    fn execute(&self, actions: Vec<SessionAction>) {
        for action in actions {
            match action {
                SessionAction::Connect => {
                    self.command(TransportCommand::Connect(self.params.clone()));
                },
                SessionAction::Send(envelope) => self.command(TransportCommand::Send(envelope)),
                SessionAction::Disconnect => self.command(TransportCommand::Disconnect),
                SessionAction::Notify(event) => {
                    if self.notifications.send(event).is_err() {
                        tracing::trace!("event stream dropped");
                    }
                },
            }
        }
    }

    fn command(&self, command: TransportCommand) {
        if let Err(e) = self.commands.send(command) {
            tracing::debug!(command = ?e.0, "transport gone, dropping command");
        }
    }

    fn handle(&self, event: TransportEvent) {
        self.apply(|session| {
            let actions = match event {
                TransportEvent::Online => session.on_transport_online(),
                TransportEvent::Closed => session.on_transport_closed(),
                TransportEvent::Error(reason) => session.on_transport_error(reason),
                TransportEvent::Inbound(raw) => session.on_inbound(&raw),
            };
            ((), actions)
        });
    }

    fn tick(&self, now: E::Instant) {
        self.apply(|session| ((), session.tick(now)));
    }
}

impl<E: Environment> Drop for Shared<E> {
    // Last client gone. Fail whatever is still pending and tell the
    // transport to close before the command channel goes away with us.
    fn drop(&mut self) {
        let session = self.session.get_mut().unwrap_or_else(PoisonError::into_inner);
        if session.state() == ConnectionState::Shutdown {
            return;
        }
        let actions = session.destroy();
        self.execute(actions);
    }
}

/// Handle to a running CCS session.
///
/// Cheap to clone; every clone drives the same session. Dropping the last
/// clone destroys the session, which fails pending deliveries with
/// `DeliveryError::Shutdown` and closes the transport's command stream.
pub struct Client<E: Environment = SystemEnv> {
    shared: Arc<Shared<E>>,
}

impl<E: Environment> Clone for Client<E> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<E: Environment> Client<E> {
    /// Create a client and spawn its driver task on the current tokio
    /// runtime.
    ///
    /// Returns the client, the transport side of the channel pair (hand it
    /// to the XMPP transport) and the event stream. The session stays idle
    /// until [`Client::connect`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(config: ClientConfig, env: E) -> (Self, TransportHandle, Events) {
        let (link, handle) = transport::channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let tick_every = config.session.ack_timeout.map(|t| (t / 4).max(MIN_TICK));

        let shared = Arc::new(Shared {
            session: Mutex::new(Session::new(env.clone(), config.session.clone())),
            commands: link.commands,
            notifications: event_tx,
            params: config.connect_params(),
            runtime: Handle::current(),
        });

        shared.runtime.spawn(drive(Arc::downgrade(&shared), link.events, env, tick_every));
        tracing::info!(jid = %shared.params.jid, capacity = config.session.capacity, "client started");

        (Self { shared }, handle, Events::new(event_rx))
    }

    /// Ask the transport to connect.
    ///
    /// # Errors
    ///
    /// - `ClientError::Session` unless idle or disconnected
    /// - `ClientError::TransportGone` if the transport handle was dropped
    pub fn connect(&self) -> Result<(), ClientError> {
        if self.shared.commands.is_closed() {
            return Err(ClientError::TransportGone);
        }
        self.shared.apply(|session| match session.connect() {
            Ok(actions) => (Ok(()), actions),
            Err(e) => (Err(e.into()), Vec::new()),
        })
    }

    /// Queue a notification for `to`.
    ///
    /// Returns immediately. The returned future resolves when the server
    /// acks or nacks the message, or when the session shuts down.
    ///
    /// # Errors
    ///
    /// - `ClientError::Session` if no unused message identifier could be
    ///   drawn
    pub fn send(
        &self,
        to: impl Into<String>,
        data: Option<Value>,
        options: SendOptions,
    ) -> Result<PendingDelivery, ClientError> {
        let (tx, rx) = oneshot::channel();
        let to = to.into();

        let message_id = self.shared.apply(|session| match session.send(to, data, options, tx) {
            Ok((message_id, actions)) => (Ok(message_id), actions),
            Err(e) => (Err(e), Vec::new()),
        })?;

        Ok(PendingDelivery { message_id, rx })
    }

    /// Callback-style [`Client::send`]: `callback` runs on the client's
    /// runtime with the outcome.
    ///
    /// # Errors
    ///
    /// Same as [`Client::send`]; `callback` is not called on error.
    pub fn send_with_callback<F>(
        &self,
        to: impl Into<String>,
        data: Option<Value>,
        options: SendOptions,
        callback: F,
    ) -> Result<MessageId, ClientError>
    where
        F: FnOnce(AckResult) + Send + 'static,
    {
        let pending = self.send(to, data, options)?;
        let message_id = pending.message_id().clone();
        self.shared.runtime.spawn(async move { callback(pending.await) });
        Ok(message_id)
    }

    /// True iff the delivery window is full. Sends still succeed.
    pub fn is_saturated(&self) -> bool {
        self.shared.lock().is_saturated()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state()
    }

    /// Occupancy and state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot()
    }

    /// Close once every message on the wire has resolved.
    pub fn end(&self) {
        self.shared.apply(|session| ((), session.end()));
    }

    /// Fail everything outstanding and close now.
    pub fn destroy(&self) {
        self.shared.apply(|session| ((), session.destroy()));
    }
}

/// Outcome of one [`Client::send`].
///
/// Resolves to `DeliveryError::Shutdown` if the session is dropped without
/// resolving the message.
#[derive(Debug)]
#[must_use = "the delivery outcome is only observable by awaiting"]
pub struct PendingDelivery {
    message_id: MessageId,
    rx: oneshot::Receiver<AckResult>,
}

impl PendingDelivery {
    /// Identifier assigned to the message.
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }
}

impl Future for PendingDelivery {
    type Output = AckResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => {
                Poll::Ready(Err(DeliveryError::Shutdown { message_id: this.message_id.clone() }))
            },
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Feed transport events (and deadline ticks) into the session until the
/// transport drops its side of the channel or the last [`Client`] is
/// dropped.
///
/// Holds the session weakly and only upgrades while handling one event, so
/// the driver never keeps a client-less session alive.
async fn drive<E: Environment>(
    shared: Weak<Shared<E>>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    env: E,
    tick_every: Option<Duration>,
) {
    match tick_every {
        None => {
            while let Some(event) = events.recv().await {
                let Some(shared) = shared.upgrade() else { break };
                shared.handle(event);
            }
        },
        Some(period) => {
            let timer = env.sleep(period);
            tokio::pin!(timer);

            loop {
                tokio::select! {
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        let Some(shared) = shared.upgrade() else { break };
                        shared.handle(event);
                    },
                    () = &mut timer => {
                        let Some(shared) = shared.upgrade() else { break };
                        shared.tick(env.now());
                        timer.set(env.sleep(period));
                    },
                }
            }
        },
    }

    tracing::debug!("driver stopping");
}
