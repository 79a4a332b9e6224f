use std::time::Duration;

/// Exponential backoff schedule for reload attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    initial_delay_ms: u64,
    ceiling_ms: u64,
}

impl RetryPolicy {
    pub fn new(initial_delay_ms: u64, ceiling_ms: u64) -> Self {
        Self {
            initial_delay_ms,
            ceiling_ms,
        }
    }

    /// Delay before the given zero-based attempt. A server-provided retry
    /// hint takes precedence when it is longer; the ceiling always wins.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after_hint_ms: Option<u64>) -> Duration {
        let doubled = self
            .initial_delay_ms
            .saturating_mul(1_u64 << attempt.min(20));
        let hinted = doubled.max(retry_after_hint_ms.unwrap_or(0));
        Duration::from_millis(hinted.min(self.ceiling_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(400, 15_000)
    }
}
