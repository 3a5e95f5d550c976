//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

use crate::config::RetryConfig;

/// Delay before retry number `attempt` (1-based) of an upstream request.
///
/// Doubles from `base_delay_ms`, capped at `max_delay_ms`, plus up to 10% jitter.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let capped = config
        .base_delay_ms
        .saturating_mul(factor)
        .min(config.max_delay_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: u64, max: u64) -> RetryConfig {
        RetryConfig {
            base_delay_ms: base,
            max_delay_ms: max,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let c = config(100, 1000);
        assert_eq!(backoff_delay(&c, 0), Duration::ZERO);

        let first = backoff_delay(&c, 1).as_millis();
        assert!((100..110).contains(&first));

        let second = backoff_delay(&c, 2).as_millis();
        assert!((200..220).contains(&second));

        let capped = backoff_delay(&c, 40).as_millis();
        assert!((1000..1100).contains(&capped));
    }
}
