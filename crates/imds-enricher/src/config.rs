// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::error;

use crate::constants::{
    DEFAULT_CACHE_TTL_HOURS, DEFAULT_MAX_PARALLEL_CALLS, DEFAULT_TIMEOUT, SECONDS_PER_HOUR,
};
use crate::errors::ConfigError;

/// Configuration for the IMDS processor
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Metadata fields attached as tags (e.g., "region", "instanceId")
    pub imds_tags: Vec<String>,
    /// Timeout for a single call to the metadata service, in seconds
    #[serde(deserialize_with = "deserialize_duration_from_seconds")]
    pub timeout: Duration,
    /// Whether metrics are emitted in the order they were received
    pub ordered: bool,
    /// Number of metrics enriched concurrently
    pub max_parallel_calls: usize,
    /// Lifetime of cached metadata, in hours
    pub cache_ttl: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            imds_tags: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            ordered: false,
            max_parallel_calls: DEFAULT_MAX_PARALLEL_CALLS,
            cache_ttl: DEFAULT_CACHE_TTL_HOURS,
        }
    }
}

impl ProcessorConfig {
    /// Create configuration from environment variables, falling back to defaults for anything
    /// unset or unparsable
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let imds_tags = env::var("DD_IMDS_TAGS")
            .map(|val| parse_tag_list(&val))
            .unwrap_or(defaults.imds_tags);
        let timeout = env::var("DD_IMDS_TIMEOUT")
            .ok()
            .and_then(|val| val.trim().parse::<f64>().ok())
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(defaults.timeout);
        let ordered = env::var("DD_IMDS_ORDERED")
            .map(|val| val.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.ordered);
        let max_parallel_calls = env::var("DD_IMDS_MAX_PARALLEL_CALLS")
            .ok()
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(defaults.max_parallel_calls);
        let cache_ttl = env::var("DD_IMDS_CACHE_TTL")
            .ok()
            .and_then(|val| val.trim().parse::<u64>().ok())
            .unwrap_or(defaults.cache_ttl);

        Self {
            imds_tags,
            timeout,
            ordered,
            max_parallel_calls,
            cache_ttl,
        }
    }

    /// Validate the settings that are not covered by the tag allow-list
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_calls == 0 {
            return Err(ConfigError::NoParallelism);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.cache_ttl.saturating_mul(SECONDS_PER_HOUR))
    }
}

/// Space-separated names are the standard, comma-separated are accepted as well
fn parse_tag_list(tags: &str) -> Vec<String> {
    tags.replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn deserialize_duration_from_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Duration, D::Error> {
    struct DurationVisitor;
    impl serde::de::Visitor<'_> for DurationVisitor {
        type Value = Duration;
        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "a duration in seconds (integer or float)")
        }
        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Duration::from_secs(v))
        }
        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
            if v < 0 {
                error!("Failed to parse timeout: negative durations are not allowed, using default");
                return Ok(DEFAULT_TIMEOUT);
            }
            Ok(Duration::from_secs(v.unsigned_abs()))
        }
        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Self::Value, E> {
            match Duration::try_from_secs_f64(v) {
                Ok(duration) => Ok(duration),
                Err(_) => {
                    error!("Failed to parse timeout: {v} is not a valid duration, using default");
                    Ok(DEFAULT_TIMEOUT)
                }
            }
        }
    }
    deserializer.deserialize_any(DurationVisitor)
}
