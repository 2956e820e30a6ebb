// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Gateway configuration.
//!
//! Loaded in priority order (later wins):
//! 1. Defaults
//! 2. YAML file (`intake.yaml`, or the path in `DD_INTAKE_CONFIG`)
//! 3. Environment variables prefixed `DD_INTAKE_`, `__` separating nested keys
//!    (`DD_INTAKE_PLUGINS__ELASTICSEARCH__URL`)

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::broker::SUBSCRIBER_CHANNEL_BUFFER_SIZE;
use crate::errors::{ConfigError, PluginError};

pub const DEFAULT_CONFIG_PATH: &str = "intake.yaml";
pub const CONFIG_PATH_ENV_VAR: &str = "DD_INTAKE_CONFIG";
pub const ENV_PREFIX: &str = "DD_INTAKE_";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_REQUEST_CONTENT_LENGTH: usize = 10 * 1024 * 1024;
const DEFAULT_MAX_DECOMPRESSED_LENGTH: usize = 64 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    #[must_use]
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("unknown log level: {s}")),
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_directive())
    }
}

/// Free-form settings of one plugin.
///
/// A plugin listed without a body (`logger:` in YAML) gets empty settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "Option<BTreeMap<String, Value>>",
    into = "BTreeMap<String, Value>"
)]
pub struct PluginSettings(BTreeMap<String, Value>);

impl From<Option<BTreeMap<String, Value>>> for PluginSettings {
    fn from(settings: Option<BTreeMap<String, Value>>) -> Self {
        PluginSettings(settings.unwrap_or_default())
    }
}

impl From<PluginSettings> for BTreeMap<String, Value> {
    fn from(settings: PluginSettings) -> Self {
        settings.0
    }
}

impl<const N: usize> From<[(&str, Value); N]> for PluginSettings {
    fn from(entries: [(&str, Value); N]) -> Self {
        PluginSettings(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

impl PluginSettings {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, PluginError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(invalid_setting(key, "expected a string")),
        }
    }

    /// Accepts a boolean or its string form, as environment variables may provide.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, PluginError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| invalid_setting(key, "expected a boolean")),
            Some(_) => Err(invalid_setting(key, "expected a boolean")),
        }
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, PluginError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| invalid_setting(key, "expected a non-negative integer")),
            Some(Value::String(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| invalid_setting(key, "expected a non-negative integer")),
            Some(_) => Err(invalid_setting(key, "expected a non-negative integer")),
        }
    }

    /// Accepts a list of strings, or a single comma-separated string.
    pub fn get_string_list(&self, key: &str) -> Result<Option<Vec<String>>, PluginError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| invalid_setting(key, "expected a list of strings"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(Value::String(s)) => Ok(Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            Some(_) => Err(invalid_setting(key, "expected a list of strings")),
        }
    }
}

fn invalid_setting(key: &str, reason: &str) -> PluginError {
    PluginError::InvalidSetting {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: LogLevel,
    /// Upper bound for reading a request body, in seconds.
    pub read_timeout_secs: u64,
    /// Upper bound for waiting on one full subscriber queue when publishing,
    /// in seconds. The subscriber misses the message once it elapses.
    pub write_timeout_secs: u64,
    /// Upper bound for receiving request headers, in seconds. Covers both a
    /// fresh connection and the wait between kept-alive requests.
    pub idle_timeout_secs: u64,
    /// Grace period for in-flight requests and plugins on shutdown, in seconds.
    /// Both share one deadline counted from the shutdown signal.
    pub shutdown_timeout_secs: u64,
    pub max_request_content_length: usize,
    pub max_decompressed_length: usize,
    pub subscriber_queue_capacity: usize,
    pub close_broker_on_shutdown: bool,
    pub plugins: BTreeMap<String, PluginSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            log_level: LogLevel::default(),
            read_timeout_secs: 15,
            write_timeout_secs: 15,
            idle_timeout_secs: 60,
            shutdown_timeout_secs: 10,
            max_request_content_length: DEFAULT_MAX_REQUEST_CONTENT_LENGTH,
            max_decompressed_length: DEFAULT_MAX_DECOMPRESSED_LENGTH,
            subscriber_queue_capacity: SUBSCRIBER_CHANNEL_BUFFER_SIZE,
            close_broker_on_shutdown: true,
            plugins: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads the configuration from the file named by `DD_INTAKE_CONFIG`,
    /// falling back to `intake.yaml` in the working directory.
    pub fn load() -> Result<Config, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV_VAR)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        Config::load_from(&path)
    }

    /// Loads the configuration from `path`, which must exist, then applies
    /// environment overrides and validates the result.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        let timeouts = [
            ("read_timeout_secs", self.read_timeout_secs),
            ("write_timeout_secs", self.write_timeout_secs),
            ("idle_timeout_secs", self.idle_timeout_secs),
            ("shutdown_timeout_secs", self.shutdown_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
        }
        let limits = [
            ("max_request_content_length", self.max_request_content_length),
            ("max_decompressed_length", self.max_decompressed_length),
            ("subscriber_queue_capacity", self.subscriber_queue_capacity),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
        }
        Ok(())
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
