//! Exponential backoff with jitter for RATE_LIMIT retries (spec §4.10).
//!
//! Generalizes the teacher's `RetryConfig`/`delay_for_attempt` shape
//! (plain exponential, no jitter) by adding jitter, since the per-chunk
//! translate loop needs to avoid every worker waking up at the exact same
//! instant after a shared provider starts rate-limiting.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub factor: f64,
    pub jitter: f64,
    pub cap: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.25,
            cap: Duration::from_secs(60),
        }
    }
}

impl BackoffConfig {
    /// Delay for the given 1-indexed attempt: `base * factor^(attempt-1)`,
    /// capped at `cap`, then jittered by `± jitter`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.base.as_secs_f64() * self.factor.powi(attempt.saturating_sub(1) as i32);
        let capped = raw.min(self.cap.as_secs_f64());
        let span = capped * self.jitter;
        let low = (capped - span).max(0.0);
        let high = capped + span;
        let jittered = if high > low { rand::thread_rng().gen_range(low..=high) } else { capped };
        Duration::from_secs_f64(jittered.max(0.0))
    }

    pub async fn sleep(&self, attempt: u32) {
        tokio::time::sleep(self.delay_for_attempt(attempt)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_roughly_base_delay() {
        let cfg = BackoffConfig::default();
        let d = cfg.delay_for_attempt(1);
        assert!(d >= Duration::from_millis(750) && d <= Duration::from_millis(1250));
    }

    #[test]
    fn delay_grows_with_attempt() {
        let cfg = BackoffConfig::default();
        assert!(cfg.delay_for_attempt(3) > cfg.delay_for_attempt(1));
    }

    #[test]
    fn delay_is_capped() {
        let cfg = BackoffConfig::default();
        let d = cfg.delay_for_attempt(20);
        assert!(d <= Duration::from_secs(75));
    }
}
