// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the intake gateway, one enum per concern.

use std::path::PathBuf;

use hyper::StatusCode;

/// Failures while turning an HTTP request into a broker message.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("empty request body")]
    EmptyBody,

    #[error("unable to read request body: {0}")]
    Read(String),

    #[error("timed out reading request body")]
    Timeout,

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("unable to inflate request body: {0}")]
    Inflate(#[from] std::io::Error),

    #[error("inflated payload exceeds {limit} bytes")]
    DecompressedTooLarge { limit: usize },
}

impl IntakeError {
    /// Status code reported back to the agent for this failure.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            IntakeError::BodyTooLarge { .. } | IntakeError::DecompressedTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Malformed JSON or a top-level shape that does not match the expected schema.
#[derive(Debug, thiserror::Error)]
#[error("unable to decode payload: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// A raw process snapshot that does not have the
/// `[timestamp, [[username, cpu, mem, vms, rss, name, pid], ...]]` shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnapshotError {
    #[error("{what} is not an array")]
    NotAnArray { what: &'static str },

    #[error("{what} has {found} elements, expected {expected}")]
    WrongArity {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("process #{process}: field `{field}` is not {expected}")]
    FieldType {
        process: usize,
        field: &'static str,
        expected: &'static str,
    },

    #[error("snapshot timestamp is not a number")]
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentError {
    #[error("metric {metric} has no points")]
    NoPoints { metric: String },

    #[error("timestamp {seconds} is out of range")]
    Timestamp { seconds: f64 },
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    Response(String),

    #[error("unable to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error(
        "unknown plugin {0}, available plugins: {}",
        crate::plugins::AVAILABLE_PLUGINS.join(", ")
    )]
    UnknownPlugin(String),

    #[error("plugin {0} already started")]
    AlreadyStarted(String),

    #[error("plugin setup failed: {0}")]
    Setup(#[from] SinkError),

    #[error("invalid exclusion filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("invalid setting `{key}`: {reason}")]
    InvalidSetting { key: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("unable to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
