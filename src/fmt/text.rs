use chrono::Local;
use console::style;

use crate::domain::observation::Observation;
use crate::stats::{Outage, Summary};

/// One line per observation, timestamps in local time.
pub fn render_observation(o: &Observation) -> String {
    let ts = o.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
    if o.is_reachable {
        format!(
            "{} {} {} {}",
            style(ts).dim(),
            style(&o.target).green(),
            style("online").green().bold(),
            style(format!("{} ms", o.latency)).yellow()
        )
    } else {
        format!(
            "{} {} {}",
            style(ts).dim(),
            style(&o.target).green(),
            style("offline").red().bold()
        )
    }
}

pub fn render_series(series: &[Observation]) -> String {
    if series.is_empty() {
        return style("No observations").dim().to_string();
    }
    series
        .iter()
        .map(render_observation)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_summary(s: &Summary) -> String {
    format!(
        "{cnt_lbl} {cnt}  {up_lbl} {up:.2}%  {out_lbl} {outs} ({total})  {avg_out_lbl} {avg_out}  {lat_lbl} {lat} ms",
        cnt_lbl = style("Samples:").cyan().bold(),
        cnt = s.count,
        up_lbl = style("Uptime:").cyan().bold(),
        up = s.uptime_pct,
        out_lbl = style("Outages:").cyan().bold(),
        outs = s.outages,
        total = format_secs(s.total_outage_secs),
        avg_out_lbl = style("Avg outage:").cyan().bold(),
        avg_out = format_secs(s.avg_outage_secs),
        lat_lbl = style("Avg latency:").cyan().bold(),
        lat = s.avg_latency_ms,
    )
}

pub fn render_outages(outages: &[Outage]) -> String {
    if outages.is_empty() {
        return style("No outages").green().to_string();
    }
    outages
        .iter()
        .map(|o| {
            format!(
                "{} -> {}  {}",
                o.start.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                o.end.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                style(format_secs(o.duration().num_seconds())).red()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `95` -> `1m 35s`, `3700` -> `1h 1m 40s`.
pub fn format_secs(total: i64) -> String {
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m {s}s"),
        _ => format!("{h}h {m}m {s}s"),
    }
}
