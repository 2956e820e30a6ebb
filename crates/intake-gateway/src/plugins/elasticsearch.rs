// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Indexes metrics, host metadata and process snapshots into Elasticsearch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::Plugin;
use crate::broker::{Broker, Subscription};
use crate::config::PluginSettings;
use crate::document::{self, Document};
use crate::errors::PluginError;
use crate::filter::Filters;
use crate::intake::{INTAKE_ENDPOINT_V1, SERIES_ENDPOINT_V1};
use crate::payload::{decode_host_meta, decode_v1_metrics};
use crate::sink::elasticsearch::{ElasticsearchConfig, ElasticsearchSink};
use crate::sink::Sink;

pub const NAME: &str = "elasticsearch";

pub struct ElasticsearchPlugin {
    sink: Arc<dyn Sink>,
    filters: Filters,
}

impl ElasticsearchPlugin {
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>, filters: Filters) -> Self {
        ElasticsearchPlugin { sink, filters }
    }

    /// Reads `url`, `index`, `username`, `password`, `exclude` and `timeout_secs`.
    pub fn from_settings(settings: &PluginSettings) -> Result<Self, PluginError> {
        let defaults = ElasticsearchConfig::default();
        let config = ElasticsearchConfig {
            url: settings.get_string("url")?.unwrap_or(defaults.url),
            index: settings.get_string("index")?.unwrap_or(defaults.index),
            username: settings.get_string("username")?,
            password: settings.get_string("password")?,
            timeout: settings
                .get_u64("timeout_secs")?
                .map_or(defaults.timeout, Duration::from_secs),
        };
        if config.index.is_empty() {
            return Err(PluginError::InvalidSetting {
                key: "index".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let filters = match settings.get_string_list("exclude")? {
            Some(patterns) => Filters::new(patterns)?,
            None => Filters::datadog(),
        };

        let sink = ElasticsearchSink::new(config)?;
        Ok(ElasticsearchPlugin::new(Arc::new(sink), filters))
    }

    async fn process_series(&self, message: &[u8]) {
        let mut metrics = match decode_v1_metrics(message) {
            Ok(metrics) => metrics,
            Err(e) => {
                error!("Error processing metrics: {e}");
                return;
            }
        };
        let received = metrics.len();
        self.filters.exclude_v1_metrics(&mut metrics);
        debug!("{} of {received} metrics left after filtering", metrics.len());

        let documents = metrics
            .iter()
            .filter_map(|metric| match document::metric_document(metric) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!("Skipping metric: {e}");
                    None
                }
            })
            .collect();
        self.submit(documents).await;
    }

    async fn process_host_meta(&self, message: &[u8]) {
        let host_meta = match decode_host_meta(message) {
            Ok(host_meta) => host_meta,
            Err(e) => {
                error!("Error processing host metadata: {e}");
                return;
            }
        };

        let mut documents = vec![document::host_metadata_document(&host_meta, Utc::now())];
        for snapshot in host_meta.process_snapshots() {
            let docs = match snapshot {
                Ok(snapshot) => document::process_documents(&snapshot),
                Err(e) => {
                    error!("Skipping malformed process snapshot: {e}");
                    continue;
                }
            };
            match docs {
                Ok(docs) => documents.extend(docs),
                Err(e) => error!("Skipping process snapshot: {e}"),
            }
        }
        self.submit(documents).await;
    }

    async fn submit(&self, documents: Vec<Document>) {
        if documents.is_empty() {
            return;
        }
        match self.sink.submit(documents).await {
            Ok(stats) => info!(
                "flushed {} created {} failed {}",
                stats.flushed, stats.created, stats.failed
            ),
            Err(e) => error!("Error submitting documents: {e}"),
        }
    }
}

#[async_trait]
impl Plugin for ElasticsearchPlugin {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self, broker: &Broker) -> Result<Vec<Subscription>, PluginError> {
        if self.sink.prepare().await? {
            info!("Created index for {NAME} plugin");
        }
        Ok(vec![
            broker.subscribe(SERIES_ENDPOINT_V1),
            broker.subscribe(INTAKE_ENDPOINT_V1),
        ])
    }

    async fn process(&self, topic: &str, message: Bytes) {
        match topic {
            SERIES_ENDPOINT_V1 => self.process_series(&message).await,
            INTAKE_ENDPOINT_V1 => self.process_host_meta(&message).await,
            _ => debug!("Ignoring message on {topic}"),
        }
    }
}
