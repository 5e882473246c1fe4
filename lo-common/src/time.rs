//! Timestamp utilities
//!
//! Event timestamps are floating-point seconds since the Unix epoch
//! (`server.time`); client timestamps are milliseconds (`client.metadata.ts`).

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time in seconds since the epoch, as stamped on events
pub fn now_seconds() -> f64 {
    now().timestamp_micros() as f64 / 1_000_000.0
}

/// Current time in milliseconds since the epoch, as sent by clients
pub fn now_millis() -> f64 {
    now().timestamp_millis() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_seconds_is_recent() {
        let secs = now_seconds();
        // After 2020-01-01 and before 2100-01-01
        assert!(secs > 1_577_836_800.0);
        assert!(secs < 4_102_444_800.0);
    }

    #[test]
    fn test_millis_and_seconds_agree() {
        let secs = now_seconds();
        let millis = now_millis();
        assert!((millis / 1000.0 - secs).abs() < 5.0);
    }

    #[tokio::test]
    async fn test_now_successive_calls_advance() {
        let t1 = now_seconds();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let t2 = now_seconds();
        assert!(t2 > t1);
    }
}
