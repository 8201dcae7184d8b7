// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cache-aware resolution of a single metadata field.
//!
//! Cache hits never touch the metadata service. Misses go through one process-wide fetch
//! section so a burst of metrics arriving with a cold cache results in one call to IMDS, not
//! one call per metric: callers queued behind an in-flight fetch re-check the cache before
//! calling out themselves.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::MetadataCache;
use crate::client::ImdsClient;
use crate::errors::LookupError;
use crate::field::MetadataField;
use crate::identity::InstanceIdentityDocument;

pub struct MetadataFetcher {
    client: Arc<dyn ImdsClient>,
    cache: Arc<MetadataCache>,
    fetch_lock: Mutex<()>,
    timeout: Duration,
}

impl MetadataFetcher {
    pub fn new(client: Arc<dyn ImdsClient>, cache: Arc<MetadataCache>, timeout: Duration) -> Self {
        Self {
            client,
            cache,
            fetch_lock: Mutex::new(()),
            timeout,
        }
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Fetches the identity document, bounded by the configured timeout. Bypasses the cache.
    pub async fn fetch_identity_document(&self) -> Result<InstanceIdentityDocument, LookupError> {
        tokio::time::timeout(self.timeout, self.client.get_instance_identity_document())
            .await
            .map_err(|_| LookupError::Timeout(self.timeout))?
            .map_err(LookupError::from)
    }

    /// Resolves `field`, from the cache when possible.
    ///
    /// Empty values are returned but never cached, so a field that resolves to nothing is
    /// fetched again on the next lookup. Failures are not cached either.
    pub async fn lookup(&self, field: MetadataField) -> Result<String, LookupError> {
        if let Some(value) = self.cache.get(field) {
            return Ok(value);
        }

        info!("Cache miss for tag: {field}");

        let _guard = self.fetch_lock.lock().await;
        if let Some(value) = self.cache.get(field) {
            debug!("Tag {field} was populated while waiting for the fetch lock");
            return Ok(value);
        }

        let document = self.fetch_identity_document().await?;
        let value = field.extract(&document);
        if !value.is_empty() {
            self.cache.set(field, value.clone());
        }
        Ok(value)
    }
}
