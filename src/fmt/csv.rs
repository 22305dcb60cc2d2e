use crate::stats::Outage;

/// Outage report as CSV: `start,end,duration_secs`, RFC 3339 instants.
pub fn outages_to_csv(outages: &[Outage]) -> String {
    let mut out = String::from("start,end,duration_secs\n");
    for o in outages {
        out.push_str(&format!(
            "{},{},{}\n",
            o.start.to_rfc3339(),
            o.end.to_rfc3339(),
            o.duration().num_seconds()
        ));
    }
    out
}
