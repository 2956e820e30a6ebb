// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde_json::Value;

use super::host_meta::HostMeta;
use crate::errors::SnapshotError;

const PROCESS_FIELDS: usize = 7;

/// One process line of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    pub username: String,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub vms: f64,
    pub rss: f64,
    pub name: String,
    pub pid: u64,
}

/// The processes observed at a single point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSnapshot {
    /// Epoch seconds.
    pub timestamp: f64,
    pub processes: Vec<Process>,
}

impl ProcessSnapshot {
    /// Validates a raw `[timestamp, [[username, cpu, mem, vms, rss, name, pid], ...]]` value.
    ///
    /// The whole snapshot is rejected if any process line is malformed.
    pub fn from_raw(raw: &Value) -> Result<Self, SnapshotError> {
        let pair = raw
            .as_array()
            .ok_or(SnapshotError::NotAnArray { what: "snapshot" })?;
        if pair.len() != 2 {
            return Err(SnapshotError::WrongArity {
                what: "snapshot",
                expected: 2,
                found: pair.len(),
            });
        }

        let timestamp = pair[0].as_f64().ok_or(SnapshotError::Timestamp)?;
        let lines = pair[1].as_array().ok_or(SnapshotError::NotAnArray {
            what: "process list",
        })?;

        let processes = lines
            .iter()
            .enumerate()
            .map(|(index, line)| parse_process(index, line))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProcessSnapshot {
            timestamp,
            processes,
        })
    }
}

fn parse_process(index: usize, line: &Value) -> Result<Process, SnapshotError> {
    let fields = line.as_array().ok_or(SnapshotError::NotAnArray {
        what: "process line",
    })?;
    if fields.len() != PROCESS_FIELDS {
        return Err(SnapshotError::WrongArity {
            what: "process line",
            expected: PROCESS_FIELDS,
            found: fields.len(),
        });
    }

    let string = |pos: usize, field: &'static str| {
        fields[pos]
            .as_str()
            .map(str::to_string)
            .ok_or(SnapshotError::FieldType {
                process: index,
                field,
                expected: "a string",
            })
    };
    let number = |pos: usize, field: &'static str| {
        fields[pos].as_f64().ok_or(SnapshotError::FieldType {
            process: index,
            field,
            expected: "a number",
        })
    };

    Ok(Process {
        username: string(0, "username")?,
        cpu_pct: number(1, "cpu_pct")?,
        mem_pct: number(2, "mem_pct")?,
        vms: number(3, "vms")?,
        rss: number(4, "rss")?,
        name: string(5, "name")?,
        pid: parse_pid(&fields[6]).ok_or(SnapshotError::FieldType {
            process: index,
            field: "pid",
            expected: "a non-negative integer",
        })?,
    })
}

// The agent may encode pids as floats; only integral values are accepted.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_pid(value: &Value) -> Option<u64> {
    if let Some(pid) = value.as_u64() {
        return Some(pid);
    }
    let pid = value.as_f64()?;
    (pid >= 0.0 && pid.fract() == 0.0 && pid <= u64::MAX as f64).then_some(pid as u64)
}

impl HostMeta {
    /// Lazily validates each raw snapshot, in payload order.
    pub fn process_snapshots(
        &self,
    ) -> impl Iterator<Item = Result<ProcessSnapshot, SnapshotError>> + '_ {
        self.resources
            .processes
            .snaps
            .iter()
            .map(ProcessSnapshot::from_raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{decode_host_meta, read_testdata};
    use serde_json::json;

    #[test]
    fn test_snapshots_from_fixture() {
        let host_meta = decode_host_meta(&read_testdata("host_meta.json")).expect("decode failed");
        let snapshots: Vec<_> = host_meta
            .process_snapshots()
            .collect::<Result<_, _>>()
            .expect("invalid snapshot");

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].processes.len(), 20);
        assert_eq!(snapshots[0].processes[0].name, "Google");
    }

    #[test]
    fn test_parse_snapshot() {
        let raw = json!([1_612_906_500, [["root", 1.5, 0.25, 4096, 1024.0, "launchd", 1]]]);
        let snapshot = ProcessSnapshot::from_raw(&raw).expect("invalid snapshot");
        assert_eq!(snapshot.timestamp, 1_612_906_500.0);
        assert_eq!(
            snapshot.processes,
            vec![Process {
                username: "root".to_string(),
                cpu_pct: 1.5,
                mem_pct: 0.25,
                vms: 4096.0,
                rss: 1024.0,
                name: "launchd".to_string(),
                pid: 1,
            }]
        );
    }

    #[test]
    fn test_pid_as_integral_float() {
        let raw = json!([1, [["u", 0, 0, 0, 0, "p", 42.0]]]);
        let snapshot = ProcessSnapshot::from_raw(&raw).expect("invalid snapshot");
        assert_eq!(snapshot.processes[0].pid, 42);
    }

    #[test]
    fn test_empty_process_list() {
        let snapshot = ProcessSnapshot::from_raw(&json!([1, []])).expect("invalid snapshot");
        assert!(snapshot.processes.is_empty());
    }

    #[test]
    fn test_rejects_malformed_snapshots() {
        let cases = [
            (json!({"ts": 1}), SnapshotError::NotAnArray { what: "snapshot" }),
            (
                json!([1]),
                SnapshotError::WrongArity {
                    what: "snapshot",
                    expected: 2,
                    found: 1,
                },
            ),
            (json!(["now", []]), SnapshotError::Timestamp),
            (
                json!([1, {}]),
                SnapshotError::NotAnArray {
                    what: "process list",
                },
            ),
            (
                json!([1, [["u", 0, 0, 0, 0, "p"]]]),
                SnapshotError::WrongArity {
                    what: "process line",
                    expected: 7,
                    found: 6,
                },
            ),
            (
                json!([1, [["u", 0, 0, 0, 0, "p", 1], ["u", "high", 0, 0, 0, "p", 2]]]),
                SnapshotError::FieldType {
                    process: 1,
                    field: "cpu_pct",
                    expected: "a number",
                },
            ),
            (
                json!([1, [[7, 0, 0, 0, 0, "p", 1]]]),
                SnapshotError::FieldType {
                    process: 0,
                    field: "username",
                    expected: "a string",
                },
            ),
            (
                json!([1, [["u", 0, 0, 0, 0, "p", 1.5]]]),
                SnapshotError::FieldType {
                    process: 0,
                    field: "pid",
                    expected: "a non-negative integer",
                },
            ),
            (
                json!([1, [["u", 0, 0, 0, 0, "p", -3]]]),
                SnapshotError::FieldType {
                    process: 0,
                    field: "pid",
                    expected: "a non-negative integer",
                },
            ),
        ];

        for (raw, expected) in cases {
            assert_eq!(ProcessSnapshot::from_raw(&raw), Err(expected), "{raw}");
        }
    }

    #[test]
    fn test_bad_snapshot_does_not_hide_good_ones() {
        let host_meta = decode_host_meta(
            br#"{"resources": {"processes": {"snaps": [[1, []], "garbage", [2, [["u", 0, 0, 0, 0, "p", 9]]]]}}}"#,
        )
        .expect("decode failed");
        let results: Vec<_> = host_meta.process_snapshots().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().map(|s| s.timestamp), Ok(2.0));
    }
}
