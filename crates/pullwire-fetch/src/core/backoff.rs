use std::time::Duration;

/// Calculate the delay before a retry attempt using exponential backoff.
///
/// The delay formula is: `base * 2^retry_count`
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pullwire_fetch::core::retry_delay;
///
/// assert_eq!(retry_delay(0, Duration::from_secs(3)), Duration::from_secs(3));
/// assert_eq!(retry_delay(1, Duration::from_secs(3)), Duration::from_secs(6));
/// assert_eq!(retry_delay(2, Duration::from_secs(3)), Duration::from_secs(12));
/// ```
pub fn retry_delay(retry_count: u32, base: Duration) -> Duration {
    let multiplier = 2_u32.saturating_pow(retry_count);
    base.saturating_mul(multiplier)
}

/// Wait before the attempt following `attempt`, given the status of the
/// last response (if there was one).
///
/// A 429 switches to `long_backoff_on_429` when that is longer than the
/// exponential delay; it is used verbatim, not scaled.
pub fn backoff_delay(
    attempt: u32,
    base: Duration,
    last_status: Option<u16>,
    long_backoff_on_429: Option<Duration>,
) -> Duration {
    let delay = retry_delay(attempt, base);
    match (last_status, long_backoff_on_429) {
        (Some(429), Some(long)) if long > delay => long,
        _ => delay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_growth() {
        let base = Duration::from_millis(10);
        let delays: Vec<Duration> = (0..5).map(|i| retry_delay(i, base)).collect();
        assert_eq!(delays[0], base);
        for i in 1..delays.len() {
            assert_eq!(delays[i], delays[i - 1] * 2);
        }
    }

    #[test]
    fn zero_base_stays_zero() {
        assert_eq!(retry_delay(10, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let delay = retry_delay(40, Duration::from_secs(u64::MAX / 2));
        assert_eq!(delay, Duration::MAX);
    }

    #[test]
    fn long_429_backoff_wins_when_longer() {
        let base = Duration::from_secs(5);
        // attempt 3 -> 5s * 8 = 40s
        assert_eq!(
            backoff_delay(3, base, Some(429), Some(Duration::from_secs(601))),
            Duration::from_secs(601)
        );
    }

    #[test]
    fn long_429_backoff_ignored_when_shorter() {
        let base = Duration::from_secs(5);
        assert_eq!(
            backoff_delay(3, base, Some(429), Some(Duration::from_secs(10))),
            Duration::from_secs(40)
        );
    }

    #[test]
    fn long_backoff_only_applies_to_429() {
        let base = Duration::from_secs(1);
        let long = Some(Duration::from_secs(601));
        assert_eq!(backoff_delay(0, base, Some(503), long), base);
        assert_eq!(backoff_delay(0, base, None, long), base);
        assert_eq!(backoff_delay(1, base, Some(429), None), Duration::from_secs(2));
    }
}
