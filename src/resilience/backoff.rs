//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::resilience::retries::RetryPolicy;

/// Delay before the attempt after `failed_attempt` (1-based).
///
/// `base * 2^(n-1)`, capped at the policy maximum, plus up to 10% jitter.
pub fn backoff_delay(policy: &RetryPolicy, failed_attempt: u32) -> Duration {
    let Some(exponent) = failed_attempt.checked_sub(1) else {
        return Duration::ZERO;
    };

    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let capped = policy
        .base_delay_ms
        .saturating_mul(factor)
        .min(policy.max_delay_ms);

    let spread = capped / 10;
    let jitter = match spread {
        0 => 0,
        n => rand::thread_rng().gen_range(0..n),
    };
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_capped() {
        let policy = RetryPolicy::new(5, 100);

        let first = backoff_delay(&policy, 1).as_millis();
        assert!((100..110).contains(&first));

        let second = backoff_delay(&policy, 2).as_millis();
        assert!((200..220).contains(&second));

        let capped = backoff_delay(&policy, 40).as_millis();
        assert!((1600..1760).contains(&capped));
    }

    #[test]
    fn test_no_delay_before_first_attempt() {
        assert_eq!(backoff_delay(&RetryPolicy::new(3, 100), 0), Duration::ZERO);
    }
}
