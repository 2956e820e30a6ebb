// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::document::Document;
use crate::errors::SinkError;

pub mod elasticsearch;

/// Outcome of a submission, counted per document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Documents accepted by the sink.
    pub flushed: usize,
    /// Accepted documents that did not exist before.
    pub created: usize,
    /// Documents the sink rejected.
    pub failed: usize,
}

impl std::ops::AddAssign for FlushStats {
    fn add_assign(&mut self, other: Self) {
        self.flushed += other.flushed;
        self.created += other.created;
        self.failed += other.failed;
    }
}

/// A destination for documents.
#[async_trait]
pub trait Sink: Send + Sync {
    /// One-time setup before the first submission. Returns whether anything was created.
    async fn prepare(&self) -> Result<bool, SinkError>;

    /// Sends a batch of documents.
    ///
    /// Per-document rejections are counted in the returned stats; an `Err`
    /// means the batch as a whole could not be delivered.
    async fn submit(&self, documents: Vec<Document>) -> Result<FlushStats, SinkError>;
}
