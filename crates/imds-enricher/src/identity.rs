// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The EC2 instance identity document.
//!
//! IMDS serves it as JSON from `/latest/dynamic/instance-identity/document`. Several keys are
//! `null` on most instances (`kernelId`, `ramdiskId`, `billingProducts`), so every field is
//! decoded leniently and a missing or `null` value becomes the empty default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdentityDocument {
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub account_id: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub architecture: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub availability_zone: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub billing_products: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub image_id: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub instance_id: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub instance_type: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub kernel_id: String,
    #[serde(default)]
    pub pending_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub private_ip: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub ramdisk_id: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub region: String,
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub version: String,
}

fn deserialize_null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl InstanceIdentityDocument {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}
