// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Azure Reconcile
//!
//! Merges a new VHD into the disk versions and SKUs of a plan's technical
//! configuration.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Implements azure_reconcile
//!
//! # Image Types
//!
//! Every image of a disk version carries an image type such as `x64Gen2`.
//! Generation 1 only exists for `x64`; other architectures only have Gen2.
//! The default generation gets the SKU named after the plan while the
//! alternate generation gets the `-genN` suffix.

use crate::domain::azure::{
    DiskLifecycleState, DiskVersion, PlanSummary, Product, SubmissionTarget, VmImageDefinition,
    VmImageSource, VmiPlanTechConfig, VmiSku,
};
use crate::domain::error::{CloudPubError, Result};
use crate::domain::metadata::{AzurePublishingMetadata, Generation};
use crate::infrastructure::http::get_url_params;
use serde_json::Map;
use std::collections::BTreeMap;
use tracing::{debug, error};

/// SAS parameters regenerated every time a SAS URI is issued
const VOLATILE_SAS_PARAMS: [&str; 4] = ["st", "se", "sv", "sig"];

/// Highest submission target in which the SAS was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SasFoundStatus {
    Missing,
    Draft,
    Preview,
    Live,
}

impl From<SubmissionTarget> for SasFoundStatus {
    fn from(target: SubmissionTarget) -> Self {
        match target {
            SubmissionTarget::Draft => SasFoundStatus::Draft,
            SubmissionTarget::Preview => SasFoundStatus::Preview,
            SubmissionTarget::Live => SasFoundStatus::Live,
        }
    }
}

/// Technical configuration of a plan as read from one submission target
#[derive(Debug, Clone)]
pub struct TechConfigLookup {
    pub tech_config: VmiPlanTechConfig,
    pub sas_found: bool,
    pub product: Product,
    pub plan: PlanSummary,
    pub target: SubmissionTarget,
}

pub fn get_image_type_mapping(architecture: &str, generation: Generation) -> String {
    match generation {
        Generation::V2 => format!("{}Gen2", architecture),
        Generation::V1 if architecture == "x64" => format!("{}Gen1", architecture),
        Generation::V1 => String::new(),
    }
}

fn base_sas(uri: &str) -> &str {
    uri.split('?').next().unwrap_or(uri)
}

/// Whether two SAS URIs point to the same blob with the same permissions.
///
/// When `base_only` is set only the URLs without parameters are compared.
pub fn is_sas_eq(sas1: &str, sas2: &str, base_only: bool) -> bool {
    let (base1, base2) = (base_sas(sas1), base_sas(sas2));
    if base1 != base2 {
        debug!("Got different base SAS: {} - Expected: {}", base1, base2);
        return false;
    }
    if base_only {
        return true;
    }

    let stable = |uri: &str| -> BTreeMap<String, String> {
        get_url_params(uri)
            .unwrap_or_default()
            .into_iter()
            .filter(|(k, _)| !VOLATILE_SAS_PARAMS.contains(&k.as_str()))
            .collect()
    };
    let (params1, params2) = (stable(sas1), stable(sas2));
    if params1 != params2 {
        debug!("Got different SAS parameters: {:?} - Expected: {:?}", params1, params2);
        return false;
    }
    true
}

pub fn is_sas_present(tech_config: &VmiPlanTechConfig, sas_uri: &str, base_only: bool) -> bool {
    tech_config
        .disk_versions
        .iter()
        .flat_map(|dv| dv.vm_images.iter())
        .any(|img| is_sas_eq(&img.source.os_disk.uri, sas_uri, base_only))
}

pub fn is_legacy_gen_supported(metadata: &AzurePublishingMetadata) -> bool {
    metadata.architecture() == "x64" && metadata.support_legacy
}

fn image(image_type: String, source: &VmImageSource) -> VmImageDefinition {
    VmImageDefinition {
        image_type,
        source: source.clone(),
    }
}

/// Images for the requested generation, plus Gen1 when a V2 image supports legacy.
///
/// A V1 image already is the Gen1 image: legacy support adds no second `x64Gen1`
/// definition for it, since one disk version cannot hold two images of one type.
pub fn create_vm_image_definitions(
    metadata: &AzurePublishingMetadata,
    source: &VmImageSource,
) -> Vec<VmImageDefinition> {
    let arch = metadata.architecture();
    let mut images = vec![image(get_image_type_mapping(arch, metadata.generation), source)];
    if metadata.generation == Generation::V2 && is_legacy_gen_supported(metadata) {
        images.push(image(get_image_type_mapping(arch, Generation::V1), source));
    }
    debug!("VMImageDefinitions created for \"{}\": {:?}", metadata.base.destination, images);
    images
}

pub fn create_disk_version_from_scratch(metadata: &AzurePublishingMetadata, source: &VmImageSource) -> DiskVersion {
    DiskVersion {
        version_number: metadata.disk_version.clone(),
        vm_images: create_vm_image_definitions(metadata, source),
        lifecycle_state: DiskLifecycleState::GenerallyAvailable,
        extra: Map::new(),
    }
}

pub fn seek_disk_version<'a>(tech_config: &'a mut VmiPlanTechConfig, version_number: &str) -> Option<&'a mut DiskVersion> {
    debug!(
        "Seeking the DiskVersion with version number \"{}\" for plan \"{}\"",
        version_number,
        tech_config.plan_durable_id
    );
    let found = tech_config
        .disk_versions
        .iter_mut()
        .find(|dv| !version_number.is_empty() && dv.version_number == version_number);
    if found.is_none() {
        debug!("Disk Version {} was not found.", version_number);
    }
    found
}

/// Split the images of a disk version into `(gen2, gen1)`.
pub fn vm_images_by_generation(
    disk_version: &DiskVersion,
    architecture: &str,
) -> (Option<VmImageDefinition>, Option<VmImageDefinition>) {
    let mut images = disk_version.vm_images.iter().cloned();
    let first = images.next();
    let second = images.next();

    match first {
        Some(img) if img.image_type == get_image_type_mapping(architecture, Generation::V2) => (Some(img), second),
        Some(img) => (second, Some(img)),
        None => (None, None),
    }
}

/// Rebuild the images of an existing disk version with the new source
pub fn prepare_vm_images(
    metadata: &AzurePublishingMetadata,
    gen1: Option<&VmImageDefinition>,
    gen2: Option<&VmImageDefinition>,
    source: &VmImageSource,
) -> Result<Vec<VmImageDefinition>> {
    if gen1.is_none() && gen2.is_none() {
        let msg = "At least one argument of \"gen1\" or \"gen2\" must be set.";
        error!("{}", msg);
        return Err(CloudPubError::InvalidInput(msg.to_string()));
    }

    let arch = metadata.architecture();
    let gen1_new = image(get_image_type_mapping(arch, Generation::V1), source);
    let gen2_new = image(get_image_type_mapping(arch, Generation::V2), source);

    Ok(match metadata.generation {
        Generation::V2 if is_legacy_gen_supported(metadata) => vec![gen2_new, gen1_new],
        Generation::V2 => vec![gen2_new],
        Generation::V1 => vec![gen1_new],
    })
}

/// Point the disk version to the new SAS URI
pub fn set_new_sas_disk_version(
    disk_version: &mut DiskVersion,
    metadata: &AzurePublishingMetadata,
    source: &VmImageSource,
) -> Result<()> {
    if disk_version.vm_images.is_empty() {
        debug!(
            "Setting the new image \"{}\" on DiskVersion \"{}\".",
            metadata.base.image_path, disk_version.version_number
        );
        disk_version.vm_images = create_vm_image_definitions(metadata, source);
        return Ok(());
    }

    debug!(
        "Adjusting the VMImages from existing DiskVersion \"{}\" to fit the new image with SAS \"{}\".",
        disk_version.version_number, metadata.base.image_path
    );
    let (gen2, gen1) = vm_images_by_generation(disk_version, metadata.architecture());
    disk_version.vm_images = prepare_vm_images(metadata, gen1.as_ref(), gen2.as_ref(), source)?;
    Ok(())
}

fn all_skus_present(old_skus: &[VmiSku], disk_versions: &[DiskVersion]) -> bool {
    disk_versions
        .iter()
        .flat_map(|dv| dv.vm_images.iter())
        .all(|img| old_skus.iter().any(|sku| sku.image_type == img.image_type))
}

fn build_skus(
    disk_versions: &[DiskVersion],
    default_gen: Generation,
    plan_name: &str,
    security_type: Option<&Vec<String>>,
) -> Vec<VmiSku> {
    let alt_gen = default_gen.alternate();
    let mut mapping: Vec<(String, String)> = Vec::new();

    for img in disk_versions.iter().flat_map(|dv| dv.vm_images.iter()) {
        let arch = img.image_type.split("Gen").next().unwrap_or_default();
        let sku_id = if arch == "x64" {
            plan_name.to_string()
        } else {
            format!("{}-{}", plan_name, arch.to_lowercase())
        };

        let entry = if img.image_type == get_image_type_mapping(arch, default_gen) {
            Some((img.image_type.clone(), sku_id))
        } else if img.image_type == get_image_type_mapping(arch, alt_gen) {
            Some((img.image_type.clone(), format!("{}-gen{}", sku_id, alt_gen.number())))
        } else {
            None
        };

        if let Some((image_type, id)) = entry {
            if !mapping.iter().any(|(t, _)| *t == image_type) {
                mapping.push((image_type, id));
            }
        }
    }

    let mut skus: Vec<VmiSku> = mapping
        .into_iter()
        .map(|(image_type, id)| VmiSku {
            // Only x64 Gen2 supports a security type
            security_type: if image_type == "x64Gen2" { security_type.cloned() } else { None },
            id,
            image_type,
        })
        .collect();
    skus.sort_by(|a, b| a.id.cmp(&b.id));
    skus
}

/// Default generation implied by an existing SKU. SKU ids are locked once
/// live, so the `-genN` suffix of the first SKU must be preserved.
fn default_generation_of(sku: &VmiSku) -> Option<Generation> {
    let gen1_image = sku.image_type.ends_with("Gen1");
    let gen2_image = sku.image_type.ends_with("Gen2");
    match (gen1_image, gen2_image) {
        (true, _) if sku.id.ends_with("gen1") => Some(Generation::V2),
        (true, _) => Some(Generation::V1),
        (_, true) if sku.id.ends_with("gen2") => Some(Generation::V1),
        (_, true) => Some(Generation::V2),
        _ => None,
    }
}

/// SKUs expected for the given disk versions
pub fn update_skus(
    disk_versions: &[DiskVersion],
    generation: Generation,
    plan_name: &str,
    old_skus: &[VmiSku],
) -> Vec<VmiSku> {
    let Some(first) = old_skus.first() else {
        return build_skus(disk_versions, generation, plan_name, None);
    };

    if all_skus_present(old_skus, disk_versions) {
        return old_skus.to_vec();
    }

    let security_type = old_skus.iter().find_map(|s| s.security_type.as_ref());
    let default_gen = default_generation_of(first).unwrap_or(generation);
    build_skus(disk_versions, default_gen, plan_name, security_type)
}

/// Drop disk versions the API refuses to receive again
pub fn filter_deprecated_disk_versions(tech_config: &mut VmiPlanTechConfig) {
    let before = tech_config.disk_versions.len();
    tech_config
        .disk_versions
        .retain(|dv| !dv.lifecycle_state.is_retired());
    let removed = before - tech_config.disk_versions.len();
    if removed > 0 {
        debug!(
            "Removed {} deprecated disk versions from \"{}\"",
            removed, tech_config.plan_durable_id
        );
    }
}
