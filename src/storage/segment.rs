//! Segment file naming, rotation deadlines and line decoding.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};

use crate::domain::observation::Observation;

pub const SEGMENT_PREFIX: &str = "connection-";
pub const SEGMENT_SUFFIX: &str = ".log";

/// Segment opened at a date boundary: `connection-YYYY-MM-DD.log`.
pub fn daily_segment_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "{SEGMENT_PREFIX}{}{SEGMENT_SUFFIX}",
        now.format("%Y-%m-%d")
    ))
}

/// Overflow segment opened when the current one grew too large:
/// `connection-YYYY-MM-DD-HH-MM-SS-<nanos>.log`.
pub fn overflow_segment_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    let nonce = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros() * 1000);
    dir.join(format!(
        "{SEGMENT_PREFIX}{}-{nonce}{SEGMENT_SUFFIX}",
        now.format("%Y-%m-%d-%H-%M-%S")
    ))
}

pub fn is_segment_name(name: &str) -> bool {
    name.len() > SEGMENT_PREFIX.len() + SEGMENT_SUFFIX.len()
        && name.starts_with(SEGMENT_PREFIX)
        && name.ends_with(SEGMENT_SUFFIX)
}

/// First instant of the local day after `now`.
///
/// Falls back to `now + 24h` when local midnight does not exist (DST gap).
pub fn next_local_midnight(now: DateTime<Local>) -> DateTime<Local> {
    now.date_naive()
        .succ_opt()
        .map(|day| day.and_time(NaiveTime::MIN))
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .unwrap_or_else(|| now + Duration::hours(24))
}

/// Decode every well-formed line; blank, truncated, non UTF-8 or foreign
/// lines are skipped individually.
pub fn parse_lines(content: &[u8]) -> impl Iterator<Item = Observation> + '_ {
    content
        .split(|&b| b == b'\n')
        .map(<[u8]>::trim_ascii)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_slice::<Observation>(line).ok())
}
