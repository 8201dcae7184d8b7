// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Errors raised while validating the processor configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("not allowed metadata tag specified in configuration: {0}")]
    NotAllowedTag(String),

    #[error("no allowed metadata tags specified in configuration")]
    NoAllowedTags,

    #[error("max_parallel_calls must be greater than 0")]
    NoParallelism,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors returned by the instance metadata service client
#[derive(Debug, thiserror::Error)]
pub enum ImdsError {
    #[error("instance metadata service is disabled")]
    Disabled,

    #[error("failed to build metadata service client: {0}")]
    Client(String),

    #[error("request to metadata service failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("metadata service returned status {status} for {path}")]
    Status { status: u16, path: &'static str },

    #[error("failed to decode instance identity document: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors raised while resolving a single metadata field
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("metadata lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Imds(#[from] ImdsError),
}

/// Errors surfaced by the processor lifecycle
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("failed getting instance identity document: {0}")]
    IdentityResolution(#[source] LookupError),

    #[error("processor is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("processor is not accepting metrics anymore")]
    Closed,
}
