use serde::Serialize;

use crate::domain::observation::Observation;
use crate::error::UplogError;
use crate::stats::{Outage, Summary};

/// Envelope printed by the `history` command.
#[derive(Serialize)]
pub struct JsonHistory<'a> {
    pub schema_version: u8,
    pub summary: &'a Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outages: Option<&'a [Outage]>,
    pub observations: &'a [Observation],
}

fn encode<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String, UplogError> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

/// Serialize observations as a JSON array, the shape served to API clients.
pub fn observations_to_json(series: &[Observation], pretty: bool) -> Result<String, UplogError> {
    encode(series, pretty)
}

pub fn history_to_json(
    series: &[Observation],
    summary: &Summary,
    outages: Option<&[Outage]>,
    pretty: bool,
) -> Result<String, UplogError> {
    encode(
        &JsonHistory {
            schema_version: 1,
            summary,
            outages,
            observations: series,
        },
        pretty,
    )
}
