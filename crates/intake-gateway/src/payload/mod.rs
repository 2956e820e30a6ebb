// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoders for the JSON payloads sent by the Datadog Agent.
//!
//! Decoding happens in the output plugins, never in the intake: the intake
//! only moves inflated bytes around.

use serde::de::{Error as _, Unexpected};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::errors::DecodeError;

pub mod host_meta;
pub mod process;
pub mod series;

pub use host_meta::{decode_host_meta, HostMeta};
pub use process::{Process, ProcessSnapshot};
pub use series::{decode_v1_metrics, Point, V1Metric};

/// The agent sends `null` for empty lists and strings; treat it like an absent field.
pub(crate) fn deserialize_null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Records are JSON objects. Derived struct decoding would also bind an array
/// by position, which the agent never sends.
pub(crate) fn require_object(value: &Value, what: &str) -> Result<(), DecodeError> {
    let unexpected = match value {
        Value::Object(_) => return Ok(()),
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
    };
    Err(serde_json::Error::invalid_type(unexpected, &what).into())
}

#[cfg(test)]
pub(crate) fn read_testdata(name: &str) -> Vec<u8> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("testdata")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("unable to read {}: {e}", path.display()))
}
