use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Hourly forecast buckets: epoch seconds of the bucket start mapped to the
/// kWh produced during that hour. Only validated entries are ever stored.
pub type ForecastDataset = BTreeMap<i64, f64>;

#[derive(Debug, Deserialize)]
pub struct ForecastPayload {
    pub status: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "preferredNextApiRequestAt")]
    pub preferred_next_api_request_at: Option<NextRequestHint>,
    #[serde(default)]
    pub data: BTreeMap<String, JsonValue>,
}

#[derive(Debug, Deserialize)]
pub struct NextRequestHint {
    #[serde(default, rename = "epochTimeUtc")]
    pub epoch_time_utc: Option<i64>,
}

#[derive(Debug, Default, PartialEq)]
pub struct Normalized {
    pub dataset: ForecastDataset,
    pub rejected: usize,
}

/// Validates the raw `data` object entry by entry. A bad entry is rejected
/// and counted without aborting the rest of the batch.
pub fn normalize(data: &BTreeMap<String, JsonValue>) -> Normalized {
    let mut normalized = Normalized::default();
    for (key, value) in data {
        match parse_entry(key, value) {
            Some((ts, kwh)) => {
                normalized.dataset.insert(ts, kwh);
            }
            None => normalized.rejected += 1,
        }
    }
    normalized
}

fn parse_entry(key: &str, value: &JsonValue) -> Option<(i64, f64)> {
    let ts = key.trim().parse::<i64>().ok()?;
    let first = value.as_array()?.first()?;
    let kwh = match first {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    kwh.is_finite().then_some((ts, kwh))
}
