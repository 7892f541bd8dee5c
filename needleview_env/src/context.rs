//! Clock abstraction shared by the session driver and the simulator.

use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// Where a tracking session gets its time from.
///
/// `TokioContext` reads the system clock and really sleeps between ticks.
/// The simulator's `SimContext` keeps a virtual clock that `sleep` advances
/// instantly, so a ten-second session replays in microseconds and every
/// pose timestamp is reproducible.
#[async_trait]
pub trait NeedleViewContext: Send + Sync + 'static {
    /// Elapsed session time; stamps accepted poses and the pose log.
    fn now(&self) -> Duration;

    /// Wall-clock time. Virtual contexts offset it from a fixed epoch.
    fn system_time(&self) -> SystemTime;

    /// Waits out one tick interval.
    async fn sleep(&self, duration: Duration);

    /// Seed behind any randomness in this context; 0 when unseeded.
    fn seed(&self) -> u64;
}
