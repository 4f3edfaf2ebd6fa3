//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources (time, randomness). The
//! production client supplies the OS clock and RNG; the harness supplies a
//! virtual clock and a seeded RNG so every run is reproducible.

use std::time::Duration;

use ccs_proto::MessageId;

/// Abstract environment providing time, randomness, and sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type used by this environment.
    ///
    /// Production uses `std::time::Instant`, simulation uses virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code sleeps; session logic never does.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Fresh random message identifier (8 random bytes, hex encoded).
    fn message_id(&self) -> MessageId {
        let mut bytes = [0u8; MessageId::RANDOM_BYTES];
        self.random_bytes(&mut bytes);
        MessageId::from_random(bytes)
    }
}
