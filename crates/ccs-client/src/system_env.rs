//! Production environment: system clock, OS randomness, tokio timers.
//!
//! Message identifiers are drawn from getrandom so independent clients
//! sharing one sender id do not collide.

use std::time::Duration;

use ccs_core::Environment;

/// Production environment using system time and the OS RNG.
///
/// # Panics
///
/// `random_bytes` panics if the OS RNG fails. Without working randomness
/// message identifiers could repeat and acks would be misattributed.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
