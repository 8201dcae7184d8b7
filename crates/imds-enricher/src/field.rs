// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The fixed set of instance metadata fields that can be attached as tags.
//!
//! Each field maps to a pure extraction function over the
//! [`InstanceIdentityDocument`]. Supporting a new field means adding a variant and a row in
//! [`FIELDS`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::SecondsFormat;

use crate::errors::ConfigError;
use crate::identity::InstanceIdentityDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetadataField {
    AccountId,
    Architecture,
    AvailabilityZone,
    BillingProducts,
    ImageId,
    InstanceId,
    InstanceType,
    KernelId,
    PendingTime,
    PrivateIp,
    RamdiskId,
    Region,
    Version,
}

pub type Extractor = fn(&InstanceIdentityDocument) -> String;

pub struct FieldSpec {
    pub field: MetadataField,
    /// Name used in configuration and as the tag key
    pub name: &'static str,
    pub extract: Extractor,
}

pub static FIELDS: [FieldSpec; 13] = [
    FieldSpec {
        field: MetadataField::AccountId,
        name: "accountId",
        extract: |doc| doc.account_id.clone(),
    },
    FieldSpec {
        field: MetadataField::Architecture,
        name: "architecture",
        extract: |doc| doc.architecture.clone(),
    },
    FieldSpec {
        field: MetadataField::AvailabilityZone,
        name: "availabilityZone",
        extract: |doc| doc.availability_zone.clone(),
    },
    FieldSpec {
        field: MetadataField::BillingProducts,
        name: "billingProducts",
        extract: |doc| doc.billing_products.join(","),
    },
    FieldSpec {
        field: MetadataField::ImageId,
        name: "imageId",
        extract: |doc| doc.image_id.clone(),
    },
    FieldSpec {
        field: MetadataField::InstanceId,
        name: "instanceId",
        extract: |doc| doc.instance_id.clone(),
    },
    FieldSpec {
        field: MetadataField::InstanceType,
        name: "instanceType",
        extract: |doc| doc.instance_type.clone(),
    },
    FieldSpec {
        field: MetadataField::KernelId,
        name: "kernelId",
        extract: |doc| doc.kernel_id.clone(),
    },
    FieldSpec {
        field: MetadataField::PendingTime,
        name: "pendingTime",
        extract: |doc| {
            doc.pending_time
                .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                .unwrap_or_default()
        },
    },
    FieldSpec {
        field: MetadataField::PrivateIp,
        name: "privateIp",
        extract: |doc| doc.private_ip.clone(),
    },
    FieldSpec {
        field: MetadataField::RamdiskId,
        name: "ramdiskId",
        extract: |doc| doc.ramdisk_id.clone(),
    },
    FieldSpec {
        field: MetadataField::Region,
        name: "region",
        extract: |doc| doc.region.clone(),
    },
    FieldSpec {
        field: MetadataField::Version,
        name: "version",
        extract: |doc| doc.version.clone(),
    },
];

impl MetadataField {
    fn spec(self) -> Option<&'static FieldSpec> {
        FIELDS.iter().find(|spec| spec.field == self)
    }

    pub fn as_str(self) -> &'static str {
        self.spec().map(|spec| spec.name).unwrap_or_default()
    }

    /// Reads this field out of an identity document. A field without an extractor yields an
    /// empty string, which is never cached nor attached.
    pub fn extract(self, doc: &InstanceIdentityDocument) -> String {
        self.spec()
            .map(|spec| (spec.extract)(doc))
            .unwrap_or_default()
    }

    pub fn all() -> impl Iterator<Item = MetadataField> {
        FIELDS.iter().map(|spec| spec.field)
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataField {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        FIELDS
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.field)
            .ok_or_else(|| ConfigError::NotAllowedTag(name.to_string()))
    }
}

/// Validates the configured tag names against the allow-list.
///
/// Fails on the first empty or unknown name, and when nothing is left to look up. Names are
/// case sensitive and duplicates collapse.
pub fn validate_fields<S: AsRef<str>>(names: &[S]) -> Result<BTreeSet<MetadataField>, ConfigError> {
    let mut fields = BTreeSet::new();
    for name in names {
        fields.insert(name.as_ref().parse::<MetadataField>()?);
    }
    if fields.is_empty() {
        return Err(ConfigError::NoAllowedTags);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::document;

    #[test]
    fn test_every_field_has_a_unique_name() {
        let names: BTreeSet<&str> = FIELDS.iter().map(|spec| spec.name).collect();
        assert_eq!(names.len(), FIELDS.len());
        for field in MetadataField::all() {
            assert_eq!(field.as_str().parse::<MetadataField>(), Ok(field));
        }
    }

    #[test]
    fn test_validate_fields_accepts_allowed() {
        let fields = validate_fields(&["region", "accountId", "region"]).unwrap();
        assert_eq!(
            fields.into_iter().collect::<Vec<_>>(),
            vec![MetadataField::AccountId, MetadataField::Region]
        );
    }

    #[test]
    fn test_validate_fields_rejects_unknown() {
        assert_eq!(
            validate_fields(&["region", "hostname"]),
            Err(ConfigError::NotAllowedTag("hostname".to_string()))
        );
        assert_eq!(
            validate_fields(&["Region"]),
            Err(ConfigError::NotAllowedTag("Region".to_string()))
        );
    }

    #[test]
    fn test_validate_fields_rejects_empty() {
        assert_eq!(
            validate_fields(&[""]),
            Err(ConfigError::NotAllowedTag(String::new()))
        );
        let none: [&str; 0] = [];
        assert_eq!(validate_fields(&none), Err(ConfigError::NoAllowedTags));
    }

    #[test]
    fn test_extract_fields() {
        let doc = document();
        assert_eq!(MetadataField::Region.extract(&doc), "us-east-1");
        assert_eq!(MetadataField::InstanceType.extract(&doc), "m5.large");
        assert_eq!(
            MetadataField::BillingProducts.extract(&doc),
            "bp-6ba54002,bp-63a5400a"
        );
        assert_eq!(
            MetadataField::PendingTime.extract(&doc),
            "2016-11-19T16:32:11Z"
        );
        assert_eq!(MetadataField::KernelId.extract(&doc), "");
    }

    #[test]
    fn test_extract_missing_pending_time_is_empty() {
        let doc = InstanceIdentityDocument::default();
        assert_eq!(MetadataField::PendingTime.extract(&doc), "");
        assert_eq!(MetadataField::BillingProducts.extract(&doc), "");
    }
}
