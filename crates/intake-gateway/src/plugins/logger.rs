// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use super::Plugin;
use crate::broker::{Broker, Subscription};
use crate::errors::PluginError;
use crate::intake::{v1_endpoints, INTAKE_ENDPOINT_V1};

pub const NAME: &str = "logger";

/// Logs every payload received on the v1 endpoints and on `/intake/`.
pub struct LoggerPlugin;

#[async_trait]
impl Plugin for LoggerPlugin {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self, broker: &Broker) -> Result<Vec<Subscription>, PluginError> {
        Ok(v1_endpoints()
            .into_iter()
            .chain(std::iter::once(INTAKE_ENDPOINT_V1))
            .map(|topic| broker.subscribe(topic))
            .collect())
    }

    async fn process(&self, topic: &str, message: Bytes) {
        info!(topic, "{}", String::from_utf8_lossy(&message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::SERIES_ENDPOINT_V1;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_subscribes_to_every_endpoint() {
        let broker = Broker::default();
        let subscriptions = LoggerPlugin.start(&broker).await.expect("start failed");

        let topics: Vec<_> = subscriptions.iter().map(Subscription::topic).collect();
        assert_eq!(topics.len(), 8);
        assert_eq!(topics[0], "/api/v1/series");
        assert_eq!(topics[7], "/intake/");
        assert_eq!(broker.subscriber_count(INTAKE_ENDPOINT_V1), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_logs_payload() {
        LoggerPlugin
            .process(SERIES_ENDPOINT_V1, Bytes::from_static(b"{\"series\":[]}"))
            .await;
        assert!(logs_contain("{\"series\":[]}"));
        assert!(logs_contain("/api/v1/series"));
    }
}
