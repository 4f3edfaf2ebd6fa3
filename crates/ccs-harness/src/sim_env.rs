//! Simulated environment: seeded RNG and a virtual clock.
//!
//! Time only moves when a test calls [`SimEnv::advance`] or something sleeps.
//! Clones share both the clock and the RNG stream, so a session and the test
//! observing it agree on "now".

use std::{
    ops::Sub,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use ccs_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Virtual instant: time since the simulation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the simulation started.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

/// Deterministic environment for simulation.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    clock: Arc<Mutex<Duration>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Environment seeded with 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with an explicit seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            clock: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, by: Duration) {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        *clock += by;
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(*self.clock.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Sleeps on the tokio clock (pause it for instant tests) and advances
    /// the virtual clock by the same amount.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        let env = self.clone();
        async move {
            tokio::time::sleep(duration).await;
            env.advance(duration);
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_ids() {
        let a = SimEnv::with_seed(7);
        let b = SimEnv::with_seed(7);
        assert_eq!(a.message_id(), b.message_id());
        assert_eq!(a.message_id(), b.message_id());
    }

    #[test]
    fn different_seeds_diverge() {
        assert_ne!(SimEnv::with_seed(1).message_id(), SimEnv::with_seed(2).message_id());
    }

    #[test]
    fn clock_moves_only_when_advanced() {
        let env = SimEnv::new();
        let start = env.now();
        assert_eq!(env.now(), start);

        env.advance(Duration::from_secs(5));
        assert_eq!(env.now() - start, Duration::from_secs(5));
        assert_eq!(start - env.now(), Duration::ZERO);
    }

    #[test]
    fn clones_share_clock() {
        let env = SimEnv::new();
        let clone = env.clone();
        clone.advance(Duration::from_millis(250));
        assert_eq!(env.now().since_start(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_advances_virtual_clock() {
        let env = SimEnv::new();
        env.sleep(Duration::from_secs(30)).await;
        assert_eq!(env.now().since_start(), Duration::from_secs(30));
    }
}
