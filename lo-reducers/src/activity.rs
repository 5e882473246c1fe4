//! Student activity status
//!
//! Derived on demand from the last event timestamp a time-on-task reducer
//! recorded; never stored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Active,
    Inactive,
}

/// Published shape: `{"status": "active"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityReport {
    pub status: ActivityStatus,
}

/// A student is active while less than `threshold` seconds have passed
/// since their last event
pub fn determine_activity_status(last_ts: f64, now: f64, threshold: f64) -> ActivityReport {
    let status = if now - last_ts < threshold {
        ActivityStatus::Active
    } else {
        ActivityStatus::Inactive
    };
    ActivityReport { status }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(determine_activity_status(100.0, 159.9, 60.0).status, ActivityStatus::Active);
        assert_eq!(determine_activity_status(100.0, 160.0, 60.0).status, ActivityStatus::Inactive);
    }

    #[test]
    fn test_serialized_shape() {
        let report = determine_activity_status(0.0, 1.0, 60.0);
        assert_eq!(serde_json::to_value(report).unwrap(), serde_json::json!({"status": "active"}));
    }
}
