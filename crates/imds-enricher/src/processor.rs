// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle of the IMDS processor.
//!
//! ```text
//! Created --init()--> Initialized --start()--> Running --stop()--> Stopped
//!    |                     |
//!    +---------------------+--> Failed
//! ```
//!
//! `init` validates the configuration and builds the cache, `start` resolves the instance
//! identity once (the processor cannot run without it) and spins up the worker pool, `stop`
//! drains the pool.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::MetadataCache;
use crate::client::{HttpImdsClient, ImdsClient, ImdsClientConfig};
use crate::config::ProcessorConfig;
use crate::constants::DEFAULT_MAX_ORDERED_QUEUE_SIZE;
use crate::enricher::Enricher;
use crate::errors::{LookupError, ProcessorError};
use crate::fetcher::MetadataFetcher;
use crate::field::{validate_fields, MetadataField};
use crate::metric::Metric;
use crate::worker_pool::{Accumulator, DeliveryMode, WorkerPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Created,
    Initialized,
    Running,
    Stopped,
    Failed,
}

impl ProcessorState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ImdsProcessor {
    config: ProcessorConfig,
    state: ProcessorState,
    fields: BTreeSet<MetadataField>,
    cache: Option<Arc<MetadataCache>>,
    client: Option<Arc<dyn ImdsClient>>,
    pool: Option<WorkerPool>,
    instance_id: Option<String>,
    cancel_token: CancellationToken,
    janitor: Option<JoinHandle<()>>,
}

impl ImdsProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            config,
            state: ProcessorState::Created,
            fields: BTreeSet::new(),
            cache: None,
            client: None,
            pool: None,
            instance_id: None,
            cancel_token: CancellationToken::new(),
            janitor: None,
        }
    }

    /// Uses `client` instead of resolving an HTTP client from the environment on start
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn ImdsClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Validated set of fields attached to each metric, empty before `init`
    pub fn fields(&self) -> &BTreeSet<MetadataField> {
        &self.fields
    }

    /// Instance id read from the identity document on start
    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    pub fn cache(&self) -> Option<&Arc<MetadataCache>> {
        self.cache.as_ref()
    }

    fn expect_state(&self, expected: ProcessorState) -> Result<(), ProcessorError> {
        if self.state == expected {
            return Ok(());
        }
        Err(ProcessorError::InvalidState {
            expected: expected.as_str(),
            actual: self.state.as_str(),
        })
    }

    pub fn init(&mut self) -> Result<(), ProcessorError> {
        debug!("Initializing AWS IMDS processor");
        self.expect_state(ProcessorState::Created)?;

        let validated = self
            .config
            .validate()
            .and_then(|()| validate_fields(&self.config.imds_tags));
        let fields = match validated {
            Ok(fields) => fields,
            Err(e) => {
                self.state = ProcessorState::Failed;
                return Err(e.into());
            }
        };

        self.fields = fields;
        self.cache = Some(Arc::new(MetadataCache::new(
            self.config.cache_ttl_duration(),
        )));
        self.state = ProcessorState::Initialized;
        Ok(())
    }

    pub async fn start(&mut self, accumulator: Arc<dyn Accumulator>) -> Result<(), ProcessorError> {
        self.expect_state(ProcessorState::Initialized)?;

        match self.launch(accumulator).await {
            Ok(()) => {
                self.state = ProcessorState::Running;
                Ok(())
            }
            Err(e) => {
                error!("Failed to start AWS IMDS processor: {e}");
                self.state = ProcessorState::Failed;
                Err(e)
            }
        }
    }

    async fn launch(&mut self, accumulator: Arc<dyn Accumulator>) -> Result<(), ProcessorError> {
        let client = match self.client.take() {
            Some(client) => client,
            None => {
                let client_config = ImdsClientConfig::from_env();
                debug!("Using metadata service at {}", client_config.endpoint);
                let client = HttpImdsClient::new(client_config, self.config.timeout)
                    .map_err(|e| ProcessorError::IdentityResolution(LookupError::from(e)))?;
                Arc::new(client)
            }
        };
        let cache = match &self.cache {
            Some(cache) => Arc::clone(cache),
            None => Arc::new(MetadataCache::new(self.config.cache_ttl_duration())),
        };

        let fetcher = MetadataFetcher::new(client, Arc::clone(&cache), self.config.timeout);
        let document = fetcher
            .fetch_identity_document()
            .await
            .map_err(ProcessorError::IdentityResolution)?;
        info!(
            "Resolved instance identity: instance {} in {}",
            document.instance_id, document.region
        );
        self.instance_id = Some(document.instance_id);

        let mode = if self.config.ordered {
            DeliveryMode::Ordered {
                queue_size: DEFAULT_MAX_ORDERED_QUEUE_SIZE,
            }
        } else {
            DeliveryMode::Unordered
        };
        let enricher = Arc::new(Enricher::new(fetcher, self.fields.clone()));
        self.pool = Some(WorkerPool::new(
            enricher,
            accumulator,
            self.config.max_parallel_calls,
            mode,
        ));
        self.janitor = cache.spawn_janitor(self.cancel_token.clone());

        debug!(
            "AWS IMDS processor running with {} workers, {:?}",
            self.config.max_parallel_calls, mode
        );
        Ok(())
    }

    /// Queues `metric` for enrichment. In ordered mode this waits while the reorder queue is
    /// full.
    pub async fn add(&self, metric: Metric) -> Result<(), ProcessorError> {
        self.expect_state(ProcessorState::Running)?;
        match &self.pool {
            Some(pool) => pool.add(metric).await,
            None => Err(ProcessorError::Closed),
        }
    }

    /// Drains in-flight metrics and releases the pool. A no-op unless running.
    pub async fn stop(&mut self) {
        if self.state != ProcessorState::Running {
            return;
        }
        if let Some(mut pool) = self.pool.take() {
            pool.stop().await;
        }
        self.cancel_token.cancel();
        if let Some(janitor) = self.janitor.take() {
            if let Err(e) = janitor.await {
                error!("Metadata cache janitor failed: {e}");
            }
        }
        self.state = ProcessorState::Stopped;
        debug!("AWS IMDS processor stopped");
    }
}
