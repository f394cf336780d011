//! Simulated environment: virtual clock and seeded randomness.
//!
//! Clones share one clock and one RNG, so every session in a simulation sees
//! the same time and draws from a single deterministic stream. Time only moves
//! when the harness calls [`SimEnv::advance`] (or a session driver awaits
//! [`Environment::sleep`]).

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use meshchat_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Deterministic [`Environment`] for simulation.
#[derive(Debug, Clone)]
pub struct SimEnv {
    clock: Arc<Mutex<Duration>>,
    rng: Arc<Mutex<ChaCha20Rng>>,
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

    /// Environment with an explicit RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(Mutex::new(Duration::ZERO)),
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
        }
    }

    /// Move virtual time forward.
    pub fn advance(&self, by: Duration) {
        *lock(&self.clock) += by;
    }

    /// Virtual time since the simulation started.
    pub fn elapsed(&self) -> Duration {
        *lock(&self.clock)
    }
}

impl Environment for SimEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        lock(&self.rng).fill_bytes(buffer);
    }
}

// A poisoned lock only means another test thread panicked mid-update; the
// clock and RNG stay usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_clock() {
        let env = SimEnv::new();
        let other = env.clone();

        env.advance(Duration::from_millis(250));
        assert_eq!(other.now(), Duration::from_millis(250));
    }

    #[test]
    fn same_seed_same_bytes() {
        let (a, b) = (SimEnv::with_seed(7), SimEnv::with_seed(7));
        let (mut x, mut y) = ([0u8; 32], [0u8; 32]);
        a.random_bytes(&mut x);
        b.random_bytes(&mut y);
        assert_eq!(x, y);

        let c = SimEnv::with_seed(8);
        c.random_bytes(&mut y);
        assert_ne!(x, y);
    }

    #[test]
    fn clones_draw_from_one_stream() {
        let env = SimEnv::with_seed(1);
        let other = env.clone();
        let (mut x, mut y) = ([0u8; 16], [0u8; 16]);
        env.random_bytes(&mut x);
        other.random_bytes(&mut y);
        assert_ne!(x, y);
    }
}
