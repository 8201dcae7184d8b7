// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::fetcher::MetadataFetcher;
use crate::field::MetadataField;
use crate::metric::Metric;
use crate::worker_pool::RecordProcessor;

/// Attaches the configured metadata fields as tags on each metric.
///
/// A field that cannot be resolved is skipped for this metric only; the metric itself is always
/// passed on.
pub struct Enricher {
    fetcher: MetadataFetcher,
    fields: BTreeSet<MetadataField>,
}

impl Enricher {
    pub fn new(fetcher: MetadataFetcher, fields: BTreeSet<MetadataField>) -> Self {
        Self { fetcher, fields }
    }

    pub fn fetcher(&self) -> &MetadataFetcher {
        &self.fetcher
    }

    pub fn fields(&self) -> &BTreeSet<MetadataField> {
        &self.fields
    }

    pub async fn enrich(&self, mut metric: Metric) -> Metric {
        for field in &self.fields {
            match self.fetcher.lookup(*field).await {
                Ok(value) if value.is_empty() => {
                    debug!("Tag {field} resolved to an empty value, not attaching it");
                }
                Ok(value) => metric.add_tag(field.as_str(), value),
                Err(e) => error!("Error when looking up {field}: {e}"),
            }
        }
        metric
    }
}

#[async_trait]
impl RecordProcessor for Enricher {
    async fn process(&self, metric: Metric) -> Metric {
        self.enrich(metric).await
    }
}
