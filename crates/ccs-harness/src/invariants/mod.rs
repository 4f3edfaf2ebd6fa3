//! Invariant checking for simulation tests.
//!
//! Invariants are properties of a [`SessionSnapshot`] that must hold after
//! every step of every scenario, whatever the interleaving of sends, acks
//! and transport events.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.assert_all(&driver.snapshot(), "after ack");
//! ```

mod checks;

use ccs_core::SessionSnapshot;
pub use checks::{
    CapacityBounded, NoIdleSlotWithBacklog, ShutdownDrained, UniqueOutstanding, WindowBound,
};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property that must hold for every reachable session state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against a snapshot.
    fn check(&self, state: &SessionSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with the standard session invariants.
    ///
    /// Includes:
    /// - [`WindowBound`]: occupied never exceeds capacity
    /// - [`CapacityBounded`]: capacity within `1..=ACK_WINDOW`
    /// - [`NoIdleSlotWithBacklog`]: online sessions never hold a message
    ///   while a slot is free
    /// - [`ShutdownDrained`]: nothing outstanding after shutdown
    /// - [`UniqueOutstanding`]: each outstanding identifier listed once
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(WindowBound);
        registry.add(CapacityBounded);
        registry.add(NoIdleSlotWithBacklog);
        registry.add(ShutdownDrained);
        registry.add(UniqueOutstanding);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants. Returns every violation found.
    pub fn check_all(&self, state: &SessionSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation.
    ///
    /// # Panics
    ///
    /// Panics if any invariant is violated.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SessionSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use ccs_core::ConnectionState;
    use ccs_proto::MessageId;

    use super::*;

    fn snapshot(state: ConnectionState, occupied: usize, backlog: usize) -> SessionSnapshot {
        let outstanding = (0..occupied + backlog).map(|n| MessageId::new(format!("m{n}"))).collect();
        SessionSnapshot { state, occupied, backlog, capacity: 100, closing: false, outstanding }
    }

    #[test]
    fn standard_registry_has_invariants() {
        assert_eq!(InvariantRegistry::standard().len(), 5);
    }

    #[test]
    fn idle_session_passes() {
        let registry = InvariantRegistry::standard();
        assert!(registry.check_all(&snapshot(ConnectionState::Idle, 0, 3)).is_ok());
    }

    #[test]
    fn overfull_window_is_reported() {
        let registry = InvariantRegistry::standard();
        let violations = registry.check_all(&snapshot(ConnectionState::Online, 101, 0)).unwrap_err();
        assert!(violations.iter().any(|v| v.invariant == "window_bound"));
    }

    #[test]
    fn held_message_with_free_slot_is_reported_only_online() {
        let registry = InvariantRegistry::standard();
        assert!(registry.check_all(&snapshot(ConnectionState::Online, 99, 1)).is_err());
        assert!(registry.check_all(&snapshot(ConnectionState::Draining, 99, 1)).is_ok());
    }

    #[test]
    fn leftovers_after_shutdown_are_reported() {
        let registry = InvariantRegistry::standard();
        let violations =
            registry.check_all(&snapshot(ConnectionState::Shutdown, 0, 2)).unwrap_err();
        assert_eq!(violations[0].invariant, "shutdown_drained");
    }

    #[test]
    fn duplicate_outstanding_id_is_reported() {
        let registry = InvariantRegistry::standard();
        let mut state = snapshot(ConnectionState::Online, 2, 0);
        state.outstanding[1] = state.outstanding[0].clone();

        let violations = registry.check_all(&state).unwrap_err();
        assert_eq!(violations[0].invariant, "unique_outstanding");
    }
}
