// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Streaming metric processor that tags every metric with fields taken from the EC2 instance
//! identity document.
//!
//! The processor owns a small cache in front of the instance metadata service (IMDS) so that a
//! busy pipeline does not hammer the endpoint, and a bounded worker pool that can either keep
//! the input order of the metrics or emit them as soon as they are ready.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod cache;
pub mod client;
pub mod config;
pub mod constants;
pub mod enricher;
pub mod errors;
pub mod fetcher;
pub mod field;
pub mod identity;
pub mod metric;
pub mod processor;
pub mod worker_pool;

#[cfg(test)]
mod test_support;
