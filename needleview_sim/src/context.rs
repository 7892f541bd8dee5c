//! Simulation context implementing NeedleViewContext for deterministic testing.

use async_trait::async_trait;
use needleview_env::NeedleViewContext;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Simulation context backed by a virtual clock.
///
/// - `now()` reads the virtual clock
/// - `sleep()` advances it instead of waiting
/// - Clones share the same clock
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<AtomicU64>,

    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: SystemTime,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
        }
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        self.virtual_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        self.virtual_time_ns.store(time_ns, Ordering::SeqCst);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl NeedleViewContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
