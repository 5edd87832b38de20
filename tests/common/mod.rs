//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(100)
}

/// Generous bound for waits that should complete promptly
pub fn long_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Returns `{0, 1, ..., size - 1}`
pub fn fill_range(size: usize) -> Vec<usize> {
    (0..size).collect()
}
