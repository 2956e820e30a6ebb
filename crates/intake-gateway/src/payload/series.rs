// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{deserialize_null_as_default, require_object};
use crate::errors::DecodeError;

/// A `[timestamp, value]` pair, timestamp in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point(pub f64, pub f64);

impl Point {
    #[must_use]
    pub fn timestamp(&self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.1
    }
}

/// A series as sent to `/api/v1/series`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct V1Metric {
    pub metric: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub points: Vec<Point>,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub host: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub device: String,
    #[serde(rename = "type", default, deserialize_with = "deserialize_null_as_default")]
    pub metric_type: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub interval: i64,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub source_type_name: String,
}

impl V1Metric {
    /// The point with the highest timestamp; the first one wins on ties.
    #[must_use]
    pub fn latest_point(&self) -> Option<&Point> {
        self.points
            .iter()
            .reduce(|latest, p| if p.0 > latest.0 { p } else { latest })
    }
}

#[derive(Serialize, Deserialize)]
struct SeriesPayload {
    series: Vec<V1Metric>,
}

/// Decodes a `{"series": [...]}` payload. The wrapper and every series must be objects.
pub fn decode_v1_metrics(payload: &[u8]) -> Result<Vec<V1Metric>, DecodeError> {
    let value: Value = serde_json::from_slice(payload)?;
    require_object(&value, "a series payload object")?;
    if let Some(Value::Array(series)) = value.get("series") {
        for metric in series {
            require_object(metric, "a series object")?;
        }
    }
    let payload: SeriesPayload = serde_json::from_value(value)?;
    Ok(payload.series)
}

/// Encodes metrics in the wire format accepted by [`decode_v1_metrics`].
pub fn encode_v1_metrics(series: &[V1Metric]) -> Result<Vec<u8>, serde_json::Error> {
    #[derive(Serialize)]
    struct SeriesRef<'a> {
        series: &'a [V1Metric],
    }
    serde_json::to_vec(&SeriesRef { series })
}
