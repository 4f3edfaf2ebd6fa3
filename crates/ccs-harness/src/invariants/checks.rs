//! Standard invariant checks.

use std::collections::HashSet;

use ccs_core::{ConnectionState, SessionSnapshot};
use ccs_proto::ACK_WINDOW;

use super::{Invariant, InvariantResult, Violation};

/// Occupied slots never exceed capacity.
pub struct WindowBound;

impl Invariant for WindowBound {
    fn name(&self) -> &'static str {
        "window_bound"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.occupied > state.capacity {
            return Err(Violation {
                invariant: self.name(),
                message: format!("occupied {} > capacity {}", state.occupied, state.capacity),
            });
        }
        Ok(())
    }
}

/// Capacity is at least one and at most the protocol's ack window.
pub struct CapacityBounded;

impl Invariant for CapacityBounded {
    fn name(&self) -> &'static str {
        "capacity_bounded"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if !(1..=ACK_WINDOW).contains(&state.capacity) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("capacity {} outside 1..={ACK_WINDOW}", state.capacity),
            });
        }
        Ok(())
    }
}

/// While online, a message is only held if every slot is taken.
///
/// Anything else means an ack freed a slot without admitting the oldest
/// held message.
pub struct NoIdleSlotWithBacklog;

impl Invariant for NoIdleSlotWithBacklog {
    fn name(&self) -> &'static str {
        "no_idle_slot_with_backlog"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.state == ConnectionState::Online
            && state.backlog > 0
            && state.occupied < state.capacity
        {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "{} held with {} of {} slots occupied",
                    state.backlog, state.occupied, state.capacity
                ),
            });
        }
        Ok(())
    }
}

/// After shutdown every future has been resolved.
pub struct ShutdownDrained;

impl Invariant for ShutdownDrained {
    fn name(&self) -> &'static str {
        "shutdown_drained"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.state == ConnectionState::Shutdown && (state.occupied > 0 || state.backlog > 0) {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "shut down with {} pending and {} held",
                    state.occupied, state.backlog
                ),
            });
        }
        Ok(())
    }
}

/// Every outstanding identifier is counted once, either on the wire or held.
pub struct UniqueOutstanding;

impl Invariant for UniqueOutstanding {
    fn name(&self) -> &'static str {
        "unique_outstanding"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let counted = state.occupied + state.backlog;
        if state.outstanding.len() != counted {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "{} identifiers listed for {} pending and {} held",
                    state.outstanding.len(),
                    state.occupied,
                    state.backlog
                ),
            });
        }

        let mut seen = HashSet::with_capacity(counted);
        if let Some(duplicate) = state.outstanding.iter().find(|id| !seen.insert(*id)) {
            return Err(Violation {
                invariant: self.name(),
                message: format!("{duplicate} outstanding twice"),
            });
        }
        Ok(())
    }
}
