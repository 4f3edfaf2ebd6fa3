//! Bounded in-flight delivery window.
//!
//! At most `capacity` downstream messages may be unacknowledged at once.
//! Everything past that waits in a FIFO backlog and is admitted, oldest
//! first, as acks and nacks free slots. Nothing is ever dropped.
//!
//! The window decides *whether* a message may go on the wire; the caller
//! decides whether the connection currently allows sending at all and passes
//! that in as `admitting`.
//!
//! # Invariants
//!
//! - `occupied() <= capacity()` after every operation.
//! - Held messages leave the backlog in the order they entered it.
//! - An identifier is outstanding in at most one place (pending or held).

use std::{
    collections::{HashSet, VecDeque},
    ops::Sub,
    time::Duration,
};

use ccs_proto::{ACK_WINDOW, MessageId, OutboundMessage};

use crate::{
    ack_tracker::{AckResult, AckTracker, Completion},
    error::{DeliveryError, SessionError},
};

/// A message waiting for a free slot.
struct Held<C> {
    message: OutboundMessage,
    completion: C,
}

/// Admission control over the ack table.
pub struct DeliveryWindow<C, I> {
    capacity: usize,
    tracker: AckTracker<C, I>,
    backlog: VecDeque<Held<C>>,
    outstanding: HashSet<MessageId>,
}

impl<C, I> DeliveryWindow<C, I>
where
    C: Completion,
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Window with the given capacity, clamped to `1..=ACK_WINDOW`.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.clamp(1, ACK_WINDOW),
            tracker: AckTracker::new(),
            backlog: VecDeque::new(),
            outstanding: HashSet::new(),
        }
    }

    /// Maximum number of unacknowledged messages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages on the wire awaiting ack or nack.
    pub fn occupied(&self) -> usize {
        self.tracker.len()
    }

    /// Messages waiting for a slot.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// True iff no slot is free.
    pub fn is_saturated(&self) -> bool {
        self.occupied() >= self.capacity
    }

    /// True iff nothing is on the wire.
    pub fn is_idle(&self) -> bool {
        self.tracker.is_empty()
    }

    /// True if `message_id` is pending or held.
    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.outstanding.contains(message_id)
    }

    /// Messages on the wire, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.tracker.all_pending().into_iter()
    }

    /// Held messages, oldest first.
    pub fn held(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.backlog.iter().map(|held| &held.message)
    }

    /// Accept a message for delivery.
    ///
    /// The message joins the back of the backlog; if `admitting`, free slots
    /// are then filled from the front. Returns the messages that must go on
    /// the wire now, which includes `message` iff a slot was free and nothing
    /// was held ahead of it.
    ///
    /// # Errors
    ///
    /// - `SessionError::DuplicateMessageId` if the identifier is outstanding
    pub fn admit(
        &mut self,
        message: OutboundMessage,
        completion: C,
        admitting: bool,
        now: I,
    ) -> Result<Vec<OutboundMessage>, SessionError> {
        if !self.outstanding.insert(message.message_id.clone()) {
            return Err(SessionError::DuplicateMessageId(message.message_id));
        }

        self.backlog.push_back(Held { message, completion });

        if admitting { Ok(self.fill(now)) } else { Ok(Vec::new()) }
    }

    /// Move held messages onto the wire until the window is full.
    pub fn fill(&mut self, now: I) -> Vec<OutboundMessage> {
        let mut admitted = Vec::new();

        while !self.is_saturated() {
            let Some(Held { message, completion }) = self.backlog.pop_front() else {
                break;
            };

            let wire = message.clone();
            match self.tracker.register(message, completion, now) {
                Ok(()) => admitted.push(wire),
                Err(e) => {
                    // Unreachable while `outstanding` guards admission.
                    tracing::error!(error = %e, "dropping held message");
                    self.outstanding.remove(&wire.message_id);
                },
            }
        }

        debug_assert!(self.occupied() <= self.capacity);
        admitted
    }

    /// Resolve one pending message without refilling.
    ///
    /// Returns `false` for identifiers that are not pending.
    pub fn resolve(&mut self, message_id: &MessageId, outcome: AckResult) -> bool {
        if self.tracker.resolve(message_id, outcome) {
            self.outstanding.remove(message_id);
            true
        } else {
            false
        }
    }

    /// Resolve one pending message and, if `admitting`, refill the freed
    /// slot from the backlog.
    ///
    /// Returns `None` for identifiers that are not pending, otherwise the
    /// messages that must go on the wire now.
    pub fn release(
        &mut self,
        message_id: &MessageId,
        outcome: AckResult,
        admitting: bool,
        now: I,
    ) -> Option<Vec<OutboundMessage>> {
        if !self.resolve(message_id, outcome) {
            return None;
        }

        Some(if admitting { self.fill(now) } else { Vec::new() })
    }

    /// Every pending message, for resending after a reconnect.
    pub fn retransmit(&mut self, now: I) -> Vec<OutboundMessage> {
        self.tracker.retransmit(now)
    }

    /// Fail pending messages older than `timeout` with
    /// `DeliveryError::Timeout`. Returns their identifiers.
    pub fn expire(&mut self, now: I, timeout: Duration) -> Vec<MessageId> {
        let stale = self.tracker.expired(now, timeout);
        let mut expired = Vec::with_capacity(stale.len());

        for (message_id, elapsed) in stale {
            let outcome = Err(DeliveryError::Timeout { message_id: message_id.clone(), elapsed });
            if self.resolve(&message_id, outcome) {
                expired.push(message_id);
            }
        }
        expired
    }

    /// Fail every held message. Returns the number failed.
    pub fn reject_backlog(&mut self, error: impl Fn(&MessageId) -> DeliveryError) -> usize {
        let count = self.backlog.len();
        for Held { message, completion } in self.backlog.drain(..) {
            self.outstanding.remove(&message.message_id);
            completion.complete(Err(error(&message.message_id)));
        }
        count
    }

    /// Fail every pending and held message and clear all state.
    ///
    /// Returns the number failed.
    pub fn reject_all(&mut self, error: impl Fn(&MessageId) -> DeliveryError) -> usize {
        let pending = self.tracker.reject_all(&error);
        let held = self.reject_backlog(&error);
        self.outstanding.clear();
        pending + held
    }
}
