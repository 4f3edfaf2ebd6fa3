//! Acknowledgement correlation table.
//!
//! Maps the identifier of every message currently on the wire to the handle
//! that completes its caller's future, and keeps the original message so it
//! can be retransmitted after a reconnect.
//!
//! # Invariants
//!
//! - Identifiers are unique among outstanding entries; `register` refuses a
//!   duplicate instead of overwriting the earlier completion.
//! - Each completion fires exactly once: resolving removes the entry, so a
//!   redelivered ack for the same identifier finds nothing and is a no-op.

use std::{borrow::Borrow, collections::HashMap, ops::Sub, time::Duration};

use ccs_proto::{MessageId, OutboundMessage};
use tokio::sync::oneshot;

use crate::error::{DeliveryError, SessionError};

/// Successful delivery of a downstream message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Identifier the server acknowledged
    pub message_id: MessageId,
    /// Recipient token reported by the server
    pub from: Option<String>,
}

/// Outcome of one downstream message.
pub type AckResult = Result<Delivered, DeliveryError>;

/// Handle that receives the outcome of one message.
pub trait Completion: Send {
    /// Deliver the outcome. Called at most once.
    fn complete(self, result: AckResult);
}

impl Completion for oneshot::Sender<AckResult> {
    fn complete(self, result: AckResult) {
        // Receiver dropped means the caller stopped waiting; nothing to do.
        let _ = self.send(result);
    }
}

/// Adapter for callback-style callers.
pub struct Callback<F>(pub F);

impl<F> Completion for Callback<F>
where
    F: FnOnce(AckResult) + Send,
{
    fn complete(self, result: AckResult) {
        (self.0)(result);
    }
}

/// A message on the wire awaiting its ack or nack.
#[derive(Debug)]
pub struct PendingAck<C, I> {
    /// Message as originally sent
    pub message: OutboundMessage,
    /// When the message was last put on the wire
    pub sent_at: I,
    completion: C,
    seq: u64,
}

/// Identifier to pending completion table.
#[derive(Debug)]
pub struct AckTracker<C, I> {
    entries: HashMap<MessageId, PendingAck<C, I>>,
    next_seq: u64,
}

impl<C, I> Default for AckTracker<C, I> {
    fn default() -> Self {
        Self { entries: HashMap::new(), next_seq: 0 }
    }
}

impl<C, I> AckTracker<C, I>
where
    C: Completion,
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if `message_id` is outstanding.
    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.entries.contains_key(message_id)
    }

    /// Track a message that is being put on the wire.
    ///
    /// # Errors
    ///
    /// - `SessionError::DuplicateMessageId` if the identifier is already
    ///   outstanding. The completion is dropped unfired.
    pub fn register(
        &mut self,
        message: OutboundMessage,
        completion: C,
        now: I,
    ) -> Result<(), SessionError> {
        if self.entries.contains_key(&message.message_id) {
            return Err(SessionError::DuplicateMessageId(message.message_id));
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let message_id = message.message_id.clone();
        self.entries.insert(message_id, PendingAck { message, sent_at: now, completion, seq });
        Ok(())
    }

    /// Complete the entry for `message_id` with `outcome`.
    ///
    /// Returns `false` (and does nothing) for unknown, duplicate or already
    /// resolved identifiers.
    pub fn resolve(&mut self, message_id: &MessageId, outcome: AckResult) -> bool {
        match self.entries.remove(message_id) {
            Some(entry) => {
                entry.completion.complete(outcome);
                true
            },
            None => false,
        }
    }

    /// Outstanding messages in insertion order.
    pub fn all_pending(&self) -> Vec<&OutboundMessage> {
        in_send_order::<_, C, I>(self.entries.values())
            .into_iter()
            .map(|entry| &entry.message)
            .collect()
    }

    /// Outstanding messages in insertion order, restarting their deadline
    /// clocks at `now`.
    pub fn retransmit(&mut self, now: I) -> Vec<OutboundMessage> {
        in_send_order::<_, C, I>(self.entries.values_mut())
            .into_iter()
            .map(|entry| {
                entry.sent_at = now;
                entry.message.clone()
            })
            .collect()
    }

    /// Identifiers sent more than `timeout` ago, in insertion order, with
    /// their elapsed time.
    pub fn expired(&self, now: I, timeout: Duration) -> Vec<(MessageId, Duration)> {
        in_send_order::<_, C, I>(self.entries.values())
            .into_iter()
            .filter(|entry| now - entry.sent_at > timeout)
            .map(|entry| (entry.message.message_id.clone(), now - entry.sent_at))
            .collect()
    }

    /// Fail every outstanding entry and clear the table.
    ///
    /// Returns the number of completions fired.
    pub fn reject_all(&mut self, error: impl Fn(&MessageId) -> DeliveryError) -> usize {
        let entries = in_send_order::<_, C, I>(self.entries.drain().map(|(_, entry)| entry));

        let count = entries.len();
        for entry in entries {
            let err = error(&entry.message.message_id);
            entry.completion.complete(Err(err));
        }
        count
    }
}

/// Order entries by registration sequence.
fn in_send_order<P, C, I>(entries: impl IntoIterator<Item = P>) -> Vec<P>
where
    P: Borrow<PendingAck<C, I>>,
{
    let mut entries: Vec<P> = entries.into_iter().collect();
    entries.sort_by_key(|entry| <P as Borrow<PendingAck<C, I>>>::borrow(entry).seq);
    entries
}
