//! Wall-clock context for sessions driven by a real tracker.

use crate::NeedleViewContext;
use async_trait::async_trait;
use std::time::{Duration, Instant, SystemTime};

/// Real-time context: `now` counts from construction, `sleep` is
/// `tokio::time::sleep`.
#[derive(Debug, Clone, Copy)]
pub struct TokioContext {
    origin: Instant,
}

impl TokioContext {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NeedleViewContext for TokioContext {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn seed(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_moves_now_forward() {
        let ctx = TokioContext::new();
        let before = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        assert!(ctx.now() - before >= Duration::from_millis(10));
    }

    #[test]
    fn test_unseeded_and_after_epoch() {
        let ctx = TokioContext::default();
        assert_eq!(ctx.seed(), 0);
        assert!(ctx.system_time() > SystemTime::UNIX_EPOCH);
    }
}
