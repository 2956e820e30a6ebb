// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sink-agnostic documents built from decoded payloads.
//!
//! Field names follow the Elastic Common Schema where one exists (`@timestamp`,
//! `host.*`, `labels`). Builders are pure: the same record always yields the
//! same document, and documents are never mutated once returned.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::errors::DocumentError;
use crate::payload::{HostMeta, ProcessSnapshot, V1Metric};

pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// An ordered mapping from field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        Value::Object(document.0)
    }
}

/// Builds the document for a metric from its most recent point.
///
/// The metric value is keyed by the metric name. Structural fields take
/// precedence if a metric happens to be named like one of them.
pub fn metric_document(metric: &V1Metric) -> Result<Document, DocumentError> {
    let point = metric
        .latest_point()
        .ok_or_else(|| DocumentError::NoPoints {
            metric: metric.metric.clone(),
        })?;

    let mut doc = Document::default();
    doc.insert(&metric.metric, point.value());
    doc.insert(TIMESTAMP_FIELD, format_epoch(point.timestamp())?);
    doc.insert(
        "host",
        json!({ "name": metric.host, "hostname": metric.host }),
    );
    if !metric.tags.is_empty() {
        doc.insert("labels", labels(&metric.tags));
    }
    if metric.interval > 0 {
        doc.insert("interval", metric.interval);
    }
    if !metric.device.is_empty() {
        doc.insert("device", metric.device.as_str());
    }
    if !metric.metric_type.is_empty() {
        doc.insert("type", metric.metric_type.as_str());
    }
    if !metric.source_type_name.is_empty() {
        doc.insert("source_type_name", metric.source_type_name.as_str());
    }
    Ok(doc)
}

/// Builds the host document. Host metadata carries no timestamp of its own,
/// so the caller supplies the ingestion time.
#[must_use]
pub fn host_metadata_document(host_meta: &HostMeta, now: DateTime<Utc>) -> Document {
    let mut doc = Document::default();
    doc.insert(
        TIMESTAMP_FIELD,
        now.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    doc.insert(
        "host",
        json!({
            "name": host_meta.meta.hostname,
            "hostname": host_meta.meta.hostname,
            "id": host_meta.uuid,
            "architecture": host_meta.system_stats.machine,
            "mac": host_meta.network.mac,
            "ip": host_meta.network.ip,
        }),
    );
    if !host_meta.host_tags.system.is_empty() {
        doc.insert("labels", labels(&host_meta.host_tags.system));
    }
    doc
}

/// One document per process, all stamped with the snapshot time.
pub fn process_documents(snapshot: &ProcessSnapshot) -> Result<Vec<Document>, DocumentError> {
    let timestamp = format_epoch(snapshot.timestamp)?;
    Ok(snapshot
        .processes
        .iter()
        .map(|p| {
            let mut doc = Document::default();
            doc.insert(TIMESTAMP_FIELD, timestamp.as_str());
            doc.insert(
                "process",
                json!({
                    "username": p.username,
                    "cpu_pct": p.cpu_pct,
                    "mem_pct": p.mem_pct,
                    "vms": p.vms,
                    "rss": p.rss,
                    "name": p.name,
                    "pid": p.pid,
                }),
            );
            doc
        })
        .collect())
}

/// Turns `key:value` tags into a label map. The split happens on the first
/// `:`; a tag without one maps to an empty value. Later duplicates win.
#[must_use]
pub fn labels(tags: &[String]) -> Map<String, Value> {
    tags.iter()
        .map(|tag| {
            let (key, value) = tag.split_once(':').unwrap_or((tag.as_str(), ""));
            (key.to_string(), Value::from(value))
        })
        .collect()
}

// Sub-second precision is dropped.
#[allow(clippy::cast_possible_truncation)]
fn format_epoch(seconds: f64) -> Result<String, DocumentError> {
    DateTime::<Utc>::from_timestamp(seconds.trunc() as i64, 0)
        .filter(|_| seconds.is_finite())
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or(DocumentError::Timestamp { seconds })
}
