use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::observation::Observation;

/// Contiguous run of offline observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outage {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Outage {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub online: usize,
    pub offline: usize,
    pub uptime_pct: f64,
    pub outages: usize,
    pub total_outage_secs: i64,
    pub avg_outage_secs: i64,
    pub avg_latency_ms: i64,
}

/// Outages in a chronologically ordered series, newest first.
///
/// An outage opens at the first offline observation and closes at the next
/// online one; an outage still open at the end of the series closes at `now`.
pub fn find_outages(series: &[Observation], now: DateTime<Utc>) -> Vec<Outage> {
    let mut outages = Vec::new();
    let mut open: Option<DateTime<Utc>> = None;
    for o in series {
        match (o.is_reachable, open) {
            (false, None) => open = Some(o.timestamp),
            (true, Some(start)) => {
                outages.push(Outage {
                    start,
                    end: o.timestamp,
                });
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        outages.push(Outage { start, end: now });
    }
    outages.sort_by(|a, b| b.start.cmp(&a.start));
    outages
}

pub fn summarize(series: &[Observation], now: DateTime<Utc>) -> Summary {
    let count = series.len();
    let online = series.iter().filter(|o| o.is_reachable).count();
    let outages = find_outages(series, now);
    let total_outage_secs: i64 = outages.iter().map(|o| o.duration().num_seconds()).sum();

    let measured: Vec<i64> = series
        .iter()
        .filter(|o| o.is_reachable && o.latency > 0)
        .map(|o| o.latency)
        .collect();
    let avg_latency_ms = if measured.is_empty() {
        0
    } else {
        (measured.iter().sum::<i64>() as f64 / measured.len() as f64).round() as i64
    };

    Summary {
        count,
        online,
        offline: count - online,
        uptime_pct: if count == 0 {
            0.0
        } else {
            online as f64 * 100.0 / count as f64
        },
        outages: outages.len(),
        total_outage_secs,
        avg_outage_secs: if outages.is_empty() {
            0
        } else {
            total_outage_secs / outages.len() as i64
        },
        avg_latency_ms,
    }
}
