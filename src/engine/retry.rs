//! リトライ間隔の計算

use std::time::Duration;

/// 指数バックオフの待機時間
///
/// `unit * 2^retry_count` を `cap` で頭打ちにします。
/// `retry_count` は直前までに失敗した試行の回数です。
///
/// ```rust
/// use std::time::Duration;
/// use content_workflow::engine::backoff_delay;
///
/// let unit = Duration::from_secs(1);
/// let cap = Duration::from_secs(60);
/// assert_eq!(backoff_delay(unit, 1, cap), Duration::from_secs(2));
/// assert_eq!(backoff_delay(unit, 3, cap), Duration::from_secs(8));
/// assert_eq!(backoff_delay(unit, 10, cap), cap);
/// ```
pub fn backoff_delay(unit: Duration, retry_count: u32, cap: Duration) -> Duration {
    let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
    unit.checked_mul(factor).unwrap_or(cap).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let unit = Duration::from_millis(10);
        let cap = Duration::from_secs(10);
        assert_eq!(backoff_delay(unit, 0, cap), Duration::from_millis(10));
        assert_eq!(backoff_delay(unit, 1, cap), Duration::from_millis(20));
        assert_eq!(backoff_delay(unit, 2, cap), Duration::from_millis(40));
    }

    #[test]
    fn test_backoff_is_capped() {
        let unit = Duration::from_secs(1);
        let cap = Duration::from_secs(60);
        assert_eq!(backoff_delay(unit, 6, cap), cap);
        // オーバーフローしても上限で止まる
        assert_eq!(backoff_delay(unit, 40, cap), cap);
    }
}
