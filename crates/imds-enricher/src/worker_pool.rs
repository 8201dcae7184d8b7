// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded pool of tasks running a [`RecordProcessor`] over incoming metrics.
//!
//! A fixed number of workers drain a shared job queue, each handling one metric end-to-end
//! before picking up the next. In [`DeliveryMode::Unordered`] a worker hands its result to the
//! accumulator as soon as it is done. In [`DeliveryMode::Ordered`] every metric first reserves
//! a completion slot in a bounded queue; a single emitter task awaits the slots in arrival order
//! and releases the results, so slow metrics hold back the ones received after them. Once the
//! slot queue is full, [`WorkerPool::add`] waits for the emitter to make room.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::errors::ProcessorError;
use crate::metric::Metric;

/// Per-metric work performed by the pool
#[async_trait]
pub trait RecordProcessor: Send + Sync + 'static {
    async fn process(&self, metric: Metric) -> Metric;
}

/// Downstream sink receiving processed metrics
pub trait Accumulator: Send + Sync + 'static {
    fn add_metric(&self, metric: Metric);
}

impl Accumulator for mpsc::UnboundedSender<Metric> {
    fn add_metric(&self, metric: Metric) {
        if self.send(metric).is_err() {
            warn!("Dropping processed metric: accumulator receiver dropped");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Results are emitted as soon as they are ready
    Unordered,
    /// Results are emitted in input order, at most `queue_size` metrics may be pending
    Ordered { queue_size: usize },
}

enum Job {
    Unordered(Metric),
    Ordered(Metric, oneshot::Sender<Metric>),
}

pub struct WorkerPool {
    jobs_tx: Option<mpsc::UnboundedSender<Job>>,
    slots_tx: Option<mpsc::Sender<oneshot::Receiver<Metric>>>,
    workers: Vec<JoinHandle<()>>,
    emitter: Option<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` tasks (at least one) on the current runtime
    pub fn new<P: RecordProcessor>(
        processor: Arc<P>,
        accumulator: Arc<dyn Accumulator>,
        workers: usize,
        mode: DeliveryMode,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));

        let workers = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&processor),
                    Arc::clone(&accumulator),
                    Arc::clone(&jobs_rx),
                ))
            })
            .collect();

        let (slots_tx, emitter) = match mode {
            DeliveryMode::Unordered => (None, None),
            DeliveryMode::Ordered { queue_size } => {
                let (slots_tx, slots_rx) = mpsc::channel(queue_size.max(1));
                let emitter = tokio::spawn(run_emitter(slots_rx, accumulator));
                (Some(slots_tx), Some(emitter))
            }
        };

        Self {
            jobs_tx: Some(jobs_tx),
            slots_tx,
            workers,
            emitter,
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.emitter.is_some()
    }

    /// Queues a metric for processing. Never waits in unordered mode; in ordered mode waits
    /// while the reorder queue is full. Cancelling a waiting call queues nothing.
    pub async fn add(&self, metric: Metric) -> Result<(), ProcessorError> {
        let jobs_tx = self.jobs_tx.as_ref().ok_or(ProcessorError::Closed)?;
        let job = match &self.slots_tx {
            None => Job::Unordered(metric),
            Some(slots_tx) => {
                let (slot_tx, slot_rx) = oneshot::channel();
                slots_tx
                    .send(slot_rx)
                    .await
                    .map_err(|_| ProcessorError::Closed)?;
                Job::Ordered(metric, slot_tx)
            }
        };
        jobs_tx.send(job).map_err(|_| ProcessorError::Closed)
    }

    /// Stops accepting metrics and waits until every queued metric has been emitted.
    /// Calling it again is a no-op.
    pub async fn stop(&mut self) {
        if self.jobs_tx.take().is_none() {
            return;
        }
        self.slots_tx = None;

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                error!("Worker task failed: {e}");
            }
        }
        if let Some(emitter) = self.emitter.take() {
            if let Err(e) = emitter.await {
                error!("Emitter task failed: {e}");
            }
        }
        debug!("Worker pool drained");
    }
}

async fn run_worker<P: RecordProcessor>(
    id: usize,
    processor: Arc<P>,
    accumulator: Arc<dyn Accumulator>,
    jobs_rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
) {
    loop {
        // The receiver lock is only held while waiting for the next job
        let job = jobs_rx.lock().await.recv().await;
        match job {
            Some(Job::Unordered(metric)) => accumulator.add_metric(processor.process(metric).await),
            Some(Job::Ordered(metric, slot)) => {
                if slot.send(processor.process(metric).await).is_err() {
                    error!("Worker {id}: emitter is gone, dropping processed metric");
                }
            }
            None => break,
        }
    }
    debug!("Worker {id} stopped");
}

async fn run_emitter(
    mut slots_rx: mpsc::Receiver<oneshot::Receiver<Metric>>,
    accumulator: Arc<dyn Accumulator>,
) {
    while let Some(slot) = slots_rx.recv().await {
        match slot.await {
            Ok(metric) => accumulator.add_metric(metric),
            Err(_) => error!("Metric was lost before it could be emitted"),
        }
    }
    debug!("Emitter stopped");
}
