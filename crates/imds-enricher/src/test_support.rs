// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scripted metadata client shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::ImdsClient;
use crate::errors::ImdsError;
use crate::identity::tests::document;
use crate::identity::InstanceIdentityDocument;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Outcome {
    Ok,
    Fail,
    /// Never answers, only a timeout gets the caller out
    Hang,
}

pub(crate) struct MockImdsClient {
    document: InstanceIdentityDocument,
    script: Mutex<VecDeque<Outcome>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockImdsClient {
    pub(crate) fn new() -> Self {
        Self {
            document: document(),
            script: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Outcomes of the next calls, in order. Calls past the end of the script succeed.
    pub(crate) fn with_script(self, script: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..self
        }
    }

    pub(crate) fn with_delay(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Leaves the in-flight count on drop, so a call cancelled by a timeout is counted out too
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImdsClient for MockImdsClient {
    async fn get_instance_identity_document(&self) -> Result<InstanceIdentityDocument, ImdsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Ok);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match outcome {
            Outcome::Ok => Ok(self.document.clone()),
            Outcome::Fail => Err(ImdsError::Status {
                status: 503,
                path: crate::constants::IMDS_IDENTITY_DOCUMENT_PATH,
            }),
            Outcome::Hang => std::future::pending().await,
        }
    }
}
