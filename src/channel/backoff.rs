use std::time::Duration;

/// 第 `attempt` 次重连前的等待时间：`min(base * 2^attempt, cap)`
pub fn reconnect_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let base = Duration::from_millis(1000);
        let cap = Duration::from_millis(10_000);
        let delays: Vec<u128> = (1..=5)
            .map(|attempt| reconnect_delay(attempt, base, cap).as_millis())
            .collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn test_backoff_does_not_overflow() {
        let delay = reconnect_delay(64, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(delay, Duration::from_secs(10));
    }
}
