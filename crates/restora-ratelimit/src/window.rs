//! Fixed-window arithmetic.

use std::time::Duration;

/// A clock-aligned window of fixed length.
///
/// Window boundaries depend only on wall-clock time, so every identity shares
/// the same edges. A burst straddling an edge can see up to twice the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    length_ms: u64,
}

impl FixedWindow {
    /// Create a window of the given length, clamped to at least one millisecond.
    pub fn new(length: Duration) -> Self {
        Self {
            length_ms: (length.as_millis() as u64).max(1),
        }
    }

    pub fn length(&self) -> Duration {
        Duration::from_millis(self.length_ms)
    }

    /// Index of the window containing `now_ms`.
    pub fn index(&self, now_ms: u64) -> u64 {
        now_ms / self.length_ms
    }

    /// Start of the window containing `now_ms`, in Unix milliseconds.
    pub fn start(&self, now_ms: u64) -> u64 {
        self.index(now_ms) * self.length_ms
    }

    /// First millisecond of the next window. Always strictly after `now_ms`.
    pub fn reset_at(&self, now_ms: u64) -> u64 {
        self.start(now_ms) + self.length_ms
    }

    /// Time left in the window containing `now_ms`. Never zero.
    pub fn remaining(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.reset_at(now_ms) - now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_are_clock_aligned() {
        let window = FixedWindow::new(Duration::from_secs(60));
        assert_eq!(window.index(0), 0);
        assert_eq!(window.index(59_999), 0);
        assert_eq!(window.index(60_000), 1);
        assert_eq!(window.start(125_000), 120_000);
        assert_eq!(window.reset_at(125_000), 180_000);
    }

    #[test]
    fn test_reset_is_always_in_the_future() {
        let window = FixedWindow::new(Duration::from_secs(60));
        for now in [0, 1, 59_999, 60_000, 1_700_000_123_456] {
            assert!(window.reset_at(now) > now);
            assert!(!window.remaining(now).is_zero());
        }
        assert_eq!(window.remaining(60_000), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_length_is_clamped() {
        let window = FixedWindow::new(Duration::ZERO);
        assert_eq!(window.length(), Duration::from_millis(1));
        assert_eq!(window.reset_at(10), 11);
    }
}
