// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Capacity of the reorder queue used when metrics must keep their input order
pub const DEFAULT_MAX_ORDERED_QUEUE_SIZE: usize = 10_000;

/// Number of metrics enriched concurrently
pub const DEFAULT_MAX_PARALLEL_CALLS: usize = 10;

/// Upper bound for a single call to the metadata service
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cached metadata lifetime, in hours
pub const DEFAULT_CACHE_TTL_HOURS: u64 = 24;

pub const SECONDS_PER_HOUR: u64 = 3_600;

pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254";
pub const IMDS_TOKEN_PATH: &str = "/latest/api/token";
pub const IMDS_IDENTITY_DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/document";
pub const IMDS_TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
pub const IMDS_TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
/// Six hours, the same default session length the AWS SDKs request
pub const IMDS_TOKEN_TTL_SECONDS: u64 = 21_600;

/// Sample configuration, mirroring the environment variables understood by
/// [`crate::config::ProcessorConfig::from_env`].
pub const SAMPLE_CONFIG: &str = r#"# Attach AWS EC2 instance metadata as tags on every metric.
#
# Available tags:
# * accountId
# * architecture
# * availabilityZone
# * billingProducts
# * imageId
# * instanceId
# * instanceType
# * kernelId
# * pendingTime
# * privateIp
# * ramdiskId
# * region
# * version
DD_IMDS_TAGS="region,instanceId"

# Timeout for a single call to the metadata service, in seconds
DD_IMDS_TIMEOUT=10

# Keep the input order of the metrics. Metrics are buffered until all the
# metrics received before them have been enriched.
DD_IMDS_ORDERED=false

# Number of metrics enriched concurrently
DD_IMDS_MAX_PARALLEL_CALLS=10

# Lifetime of cached metadata, in hours. 0 disables caching.
DD_IMDS_CACHE_TTL=24
"#;
