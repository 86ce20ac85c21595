use std::time::Duration;
use tokio::time::Instant;

/// Format a `Duration` as a human-readable string with automatic unit scaling.
///
/// Produces output like `1.94ms`, `2.34s`, `150.00µs` using Rust's Debug format.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Log a warning if the elapsed time since `start` exceeds `threshold`.
/// Returns whether it did.
pub fn log_if_slow(start: Instant, threshold: Duration, label: &str) -> bool {
    let elapsed = start.elapsed();
    let slow = elapsed > threshold;
    if slow {
        tracing::warn!(
            duration = fmt_duration(elapsed),
            threshold = fmt_duration(threshold),
            "slow operation: {label}"
        );
    }
    slow
}
