// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use serde_json::Value;

use super::require_object;
use crate::errors::DecodeError;

/// Host metadata payload sent to the legacy `/intake/` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostMeta {
    pub api_key: String,
    pub agent_version: String,
    pub uuid: String,
    pub internal_hostname: String,
    pub os: String,
    #[serde(rename = "agent-flavor")]
    pub agent_flavor: String,
    pub python: String,
    pub system_stats: SystemStats,
    pub meta: Meta,
    #[serde(rename = "host-tags")]
    pub host_tags: HostTags,
    pub network: Network,
    pub logs: Logs,
    pub resources: Resources,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemStats {
    pub cpu_cores: i64,
    pub machine: String,
    pub platform: String,
    pub python_v: String,
    pub processor: String,
    pub mac_v: Value,
    pub nix_v: Value,
    pub fbsd_v: Value,
    pub win_v: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Meta {
    #[serde(rename = "socket-hostname")]
    pub socket_hostname: String,
    pub timezones: Vec<String>,
    #[serde(rename = "socket-fqdn")]
    pub socket_fqdn: String,
    #[serde(rename = "ec2-hostname")]
    pub ec2_hostname: String,
    pub hostname: String,
    pub host_aliases: Vec<String>,
    #[serde(rename = "instance-id")]
    pub instance_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HostTags {
    pub system: Vec<String>,
    #[serde(rename = "google cloud platform")]
    pub google_cloud_platform: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Network {
    #[serde(rename = "ipaddress")]
    pub ip: String,
    #[serde(rename = "ipaddressv6")]
    pub ipv6: String,
    #[serde(rename = "macaddress")]
    pub mac: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Logs {
    pub transport: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub processes: Processes,
}

/// Process snapshots stay untyped until [`HostMeta::process_snapshots`] validates them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Processes {
    pub snaps: Vec<Value>,
}

/// Decodes a host metadata payload. Absent or `null` fields take their empty value.
pub fn decode_host_meta(payload: &[u8]) -> Result<HostMeta, DecodeError> {
    let mut value: Value = serde_json::from_slice(payload)?;
    require_object(&value, "a host metadata object")?;
    strip_null_members(&mut value);
    Ok(serde_json::from_value(value)?)
}

// Array elements are left alone: process snapshots are positional and a null
// there is a shape error, not a missing field.
fn strip_null_members(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_null_members);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_null_members),
        _ => {}
    }
}
