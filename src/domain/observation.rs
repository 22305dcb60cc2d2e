use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latency value recorded when the target could not be measured.
pub const UNREACHABLE_LATENCY: i64 = -1;

/// One timestamped reachability measurement of a target.
///
/// Serialized as one JSON object per log line with the fields
/// `timestamp`, `is_online`, `latency_ms` and `target`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Instant the probe was initiated.
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "is_online")]
    pub is_reachable: bool,
    /// Round trip in milliseconds, `-1` when unreachable, `0` when reachable but unmeasured.
    #[serde(rename = "latency_ms")]
    pub latency: i64,
    pub target: String,
}

impl Observation {
    pub fn reachable(timestamp: DateTime<Utc>, target: impl Into<String>, latency: i64) -> Self {
        Self {
            timestamp,
            is_reachable: true,
            latency,
            target: target.into(),
        }
    }

    pub fn unreachable(timestamp: DateTime<Utc>, target: impl Into<String>) -> Self {
        Self {
            timestamp,
            is_reachable: false,
            latency: UNREACHABLE_LATENCY,
            target: target.into(),
        }
    }
}
