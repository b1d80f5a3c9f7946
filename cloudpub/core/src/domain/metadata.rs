// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Metadata
//!
//! Describes what to publish and where.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements metadata

use crate::domain::aws::VersionMapping;
use crate::domain::error::{CloudPubError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Common publishing request shared by every marketplace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishingMetadata {
    /// Location of the image: a SAS URI for Azure, an AMI identifier for AWS
    pub image_path: String,

    /// Image architecture (e.g. "x86_64", "aarch64")
    pub architecture: String,

    /// Marketplace destination: "product/plan" for Azure, the entity id for AWS
    pub destination: String,

    /// Replace the existing images instead of appending the new one
    #[serde(default)]
    pub overwrite: bool,

    /// Only stage the change without publishing it
    #[serde(default)]
    pub keepdraft: bool,
}

impl PublishingMetadata {
    pub fn new(
        image_path: impl Into<String>,
        architecture: impl Into<String>,
        destination: impl Into<String>,
    ) -> Result<Self> {
        let metadata = Self {
            image_path: image_path.into(),
            architecture: architecture.into(),
            destination: destination.into(),
            overwrite: false,
            keepdraft: false,
        };
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_keepdraft(mut self, keepdraft: bool) -> Self {
        self.keepdraft = keepdraft;
        self
    }

    /// Ensure all mandatory fields are set
    pub fn validate(&self) -> Result<()> {
        let mandatory = [
            ("image_path", &self.image_path),
            ("architecture", &self.architecture),
            ("destination", &self.destination),
        ];
        for (name, value) in mandatory {
            if value.trim().is_empty() {
                return Err(CloudPubError::InvalidInput(format!(
                    "The parameter \"{}\" must not be empty.",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Hyper-V generation of a VM image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Generation {
    V1,
    #[default]
    V2,
}

impl Generation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Generation::V1 => "V1",
            Generation::V2 => "V2",
        }
    }

    /// The other generation
    pub fn alternate(&self) -> Generation {
        match self {
            Generation::V1 => Generation::V2,
            Generation::V2 => Generation::V1,
        }
    }

    /// Numeric suffix used in image types and SKU ids ("1" or "2")
    pub fn number(&self) -> &'static str {
        match self {
            Generation::V1 => "1",
            Generation::V2 => "2",
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Generation {
    type Err = CloudPubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "V1" => Ok(Generation::V1),
            "V2" => Ok(Generation::V2),
            other => Err(CloudPubError::InvalidInput(format!(
                "Invalid generation \"{}\". Expected: \"V1\" or \"V2\".",
                other
            ))),
        }
    }
}

/// Convert a kernel architecture name to the one used by Azure image types.
pub fn normalize_azure_architecture(arch: &str) -> String {
    match arch {
        "x86_64" => "x64".to_string(),
        "aarch64" => "arm64".to_string(),
        other => other.to_string(),
    }
}

/// Publishing request for a VHD into an Azure plan
#[derive(Debug, Clone, PartialEq)]
pub struct AzurePublishingMetadata {
    pub base: PublishingMetadata,

    /// Disk version number in the format "{int}.{int}.{int}"
    pub disk_version: String,

    /// SKU to associate the image with (defaults to the plan name)
    pub sku_id: String,

    pub generation: Generation,

    /// Whether a V2 image also supports V1
    pub support_legacy: bool,

    pub recommended_sizes: Vec<String>,

    /// Gen1 SKU, only kept for V2 images with legacy support
    pub legacy_sku_id: Option<String>,

    /// Compare only the base of SAS URIs, ignoring their parameters
    pub check_base_sas_only: bool,

    /// Publish only the product, plan and technical configuration
    pub modular_push: bool,
}

impl AzurePublishingMetadata {
    pub fn builder(base: PublishingMetadata, disk_version: impl Into<String>) -> AzurePublishingMetadataBuilder {
        AzurePublishingMetadataBuilder {
            base,
            disk_version: disk_version.into(),
            sku_id: None,
            generation: Generation::V2,
            support_legacy: false,
            recommended_sizes: Vec::new(),
            legacy_sku_id: None,
            check_base_sas_only: false,
            modular_push: false,
        }
    }

    /// Product name from the "product/plan" destination
    pub fn product_name(&self) -> &str {
        self.base.destination.split('/').next().unwrap_or_default()
    }

    /// Plan name from the "product/plan" destination
    pub fn plan_name(&self) -> &str {
        self.base.destination.rsplit('/').next().unwrap_or_default()
    }

    pub fn architecture(&self) -> &str {
        &self.base.architecture
    }
}

pub struct AzurePublishingMetadataBuilder {
    base: PublishingMetadata,
    disk_version: String,
    sku_id: Option<String>,
    generation: Generation,
    support_legacy: bool,
    recommended_sizes: Vec<String>,
    legacy_sku_id: Option<String>,
    check_base_sas_only: bool,
    modular_push: bool,
}

impl AzurePublishingMetadataBuilder {
    pub fn sku_id(mut self, sku_id: impl Into<String>) -> Self {
        self.sku_id = Some(sku_id.into());
        self
    }

    pub fn generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }

    pub fn support_legacy(mut self, support_legacy: bool) -> Self {
        self.support_legacy = support_legacy;
        self
    }

    pub fn recommended_sizes(mut self, sizes: Vec<String>) -> Self {
        self.recommended_sizes = sizes;
        self
    }

    pub fn legacy_sku_id(mut self, legacy_sku_id: impl Into<String>) -> Self {
        self.legacy_sku_id = Some(legacy_sku_id.into());
        self
    }

    pub fn check_base_sas_only(mut self, check_base_sas_only: bool) -> Self {
        self.check_base_sas_only = check_base_sas_only;
        self
    }

    pub fn modular_push(mut self, modular_push: bool) -> Self {
        self.modular_push = modular_push;
        self
    }

    pub fn build(self) -> Result<AzurePublishingMetadata> {
        let mut base = self.base;
        base.validate()?;

        if self.disk_version.trim().is_empty() {
            return Err(CloudPubError::InvalidInput(
                "The parameter \"disk_version\" must not be empty.".to_string(),
            ));
        }
        if !base.image_path.starts_with("https://") {
            return Err(CloudPubError::InvalidInput(format!(
                "Invalid SAS URI \"{}\". Expected: https URL.",
                base.image_path
            )));
        }
        base.architecture = normalize_azure_architecture(&base.architecture);

        let sku_id = self
            .sku_id
            .unwrap_or_else(|| base.destination.rsplit('/').next().unwrap_or_default().to_string());

        let legacy_sku_id = if self.generation == Generation::V1 || !self.support_legacy {
            None
        } else {
            Some(self.legacy_sku_id.unwrap_or_else(|| format!("{}-gen1", sku_id)))
        };

        Ok(AzurePublishingMetadata {
            base,
            disk_version: self.disk_version,
            sku_id,
            generation: self.generation,
            support_legacy: self.support_legacy,
            recommended_sizes: self.recommended_sizes,
            legacy_sku_id,
            check_base_sas_only: self.check_base_sas_only,
            modular_push: self.modular_push,
        })
    }
}

/// Publishing request for a new AMI version of an AWS product
#[derive(Debug, Clone, PartialEq)]
pub struct AwsVersionMetadata {
    pub base: PublishingMetadata,

    /// Version and delivery options to add
    pub version_mapping: VersionMapping,

    /// Product type of the AWS entity (e.g. "AmiProduct")
    pub marketplace_entity_type: String,

    /// Validate the change set without applying it
    pub preview_only: bool,
}

impl AwsVersionMetadata {
    pub fn new(
        base: PublishingMetadata,
        version_mapping: VersionMapping,
        marketplace_entity_type: impl Into<String>,
    ) -> Result<Self> {
        base.validate()?;
        let marketplace_entity_type = marketplace_entity_type.into();
        if marketplace_entity_type.is_empty() {
            return Err(CloudPubError::InvalidInput(
                "The parameter \"marketplace_entity_type\" must not be empty.".to_string(),
            ));
        }
        Ok(Self {
            base,
            version_mapping,
            marketplace_entity_type,
            preview_only: false,
        })
    }

    pub fn with_preview_only(mut self, preview_only: bool) -> Self {
        self.preview_only = preview_only;
        self
    }
}
