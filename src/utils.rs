use std::time::{Duration, Instant};

/// Two-decimal `Debug` rendering of a duration: `1.94ms`, `2.34s`.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Time since `start`. Warns with the `url` and both durations as fields once
/// it exceeds `threshold`.
pub fn warn_if_slow(url: &str, start: Instant, threshold: Duration) -> Duration {
    let elapsed = start.elapsed();
    if elapsed > threshold {
        tracing::warn!(
            url,
            elapsed = fmt_duration(elapsed),
            threshold = fmt_duration(threshold),
            "Slow fetch"
        );
    }
    elapsed
}
