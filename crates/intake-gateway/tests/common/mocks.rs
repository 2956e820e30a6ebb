// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock implementations of gateway components for testing

use intake_gateway::document::Document;
use intake_gateway::errors::SinkError;
use intake_gateway::sink::{FlushStats, Sink};
use tokio::sync::Mutex;

/// Sink that keeps every submitted batch in memory
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<Vec<Document>>>,
}

impl RecordingSink {
    /// All submitted documents, in submission order.
    pub async fn documents(&self) -> Vec<Document> {
        self.batches.lock().await.iter().flatten().cloned().collect()
    }
}

#[async_trait::async_trait]
impl Sink for RecordingSink {
    async fn prepare(&self) -> Result<bool, SinkError> {
        Ok(false)
    }

    async fn submit(&self, documents: Vec<Document>) -> Result<FlushStats, SinkError> {
        let flushed = documents.len();
        self.batches.lock().await.push(documents);
        Ok(FlushStats {
            flushed,
            created: flushed,
            failed: 0,
        })
    }
}
