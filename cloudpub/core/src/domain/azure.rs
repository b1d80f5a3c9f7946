// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Azure
//!
//! JSON models of the Azure Product Ingestion API.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements azure

// Every resource keeps the fields it does not model in `extra`, so a resource
// read from the resource tree can be sent back through `configure` unchanged.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

fn last_segment(durable_id: &str) -> &str {
    durable_id.rsplit('/').next().unwrap_or(durable_id)
}

fn first_segment(durable_id: &str) -> &str {
    durable_id.split('/').next().unwrap_or(durable_id)
}

/// Resource identified by a durable id such as `product/62c171e9-...`
pub trait DurableResource {
    fn durable_id(&self) -> &str;

    /// Resource id, the last segment of the durable id
    fn id(&self) -> &str {
        last_segment(self.durable_id())
    }

    /// Resource name, the first segment of the durable id
    fn resource(&self) -> &str {
        first_segment(self.durable_id())
    }
}

/// Resource linked to a product
pub trait ProductLinked {
    fn product_durable_id(&self) -> &str;

    fn product_id(&self) -> &str {
        last_segment(self.product_durable_id())
    }
}

/// Resource linked to a plan
pub trait PlanLinked {
    fn plan_durable_id(&self) -> &str;

    fn plan_id(&self) -> &str {
        last_segment(self.plan_durable_id())
    }
}

macro_rules! durable {
    ($($ty:ty),+ $(,)?) => {
        $(impl DurableResource for $ty {
            fn durable_id(&self) -> &str {
                &self.durable_id
            }
        })+
    };
}

macro_rules! product_linked {
    ($($ty:ty),+ $(,)?) => {
        $(impl ProductLinked for $ty {
            fn product_durable_id(&self) -> &str {
                &self.product_durable_id
            }
        })+
    };
}

macro_rules! plan_linked {
    ($($ty:ty),+ $(,)?) => {
        $(impl PlanLinked for $ty {
            fn plan_durable_id(&self) -> &str {
                &self.plan_durable_id
            }
        })+
    };
}

// ============================================================================
// Submission state
// ============================================================================

/// Publishing target of a product; ordered draft < preview < live
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionTarget {
    Draft,
    Preview,
    Live,
}

impl SubmissionTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionTarget::Draft => "draft",
            SubmissionTarget::Preview => "preview",
            SubmissionTarget::Live => "live",
        }
    }

    /// The state a submission must be in before it can move to `self`
    pub fn previous(&self) -> SubmissionTarget {
        match self {
            SubmissionTarget::Live => SubmissionTarget::Preview,
            SubmissionTarget::Preview | SubmissionTarget::Draft => SubmissionTarget::Draft,
        }
    }

    /// Targets in lookup precedence: live, preview, draft
    pub fn lookup_order() -> [SubmissionTarget; 3] {
        [SubmissionTarget::Live, SubmissionTarget::Preview, SubmissionTarget::Draft]
    }
}

impl fmt::Display for SubmissionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTarget {
    #[serde(rename = "targetType")]
    pub target_type: SubmissionTarget,
}

/// Status of an asynchronous `configure` job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    NotStarted,
    Running,
    Completed,
}

/// Result of an asynchronous `configure` job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobResult {
    #[default]
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobResult::Pending => "pending",
            JobResult::Succeeded => "succeeded",
            JobResult::Failed => "failed",
            JobResult::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigureError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Value>,
}

impl fmt::Display for ConfigureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for detail in &self.details {
            write!(f, " {}", detail)?;
        }
        Ok(())
    }
}

/// Status of a `configure` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureStatus {
    pub job_id: String,
    pub job_status: JobStatus,
    #[serde(default)]
    pub job_result: JobResult,
    #[serde(default)]
    pub job_start: Option<String>,
    #[serde(default)]
    pub job_end: Option<String>,
    #[serde(default)]
    pub resource_uri: Option<String>,
    #[serde(default)]
    pub errors: Vec<ConfigureError>,
}

impl ConfigureStatus {
    /// Placeholder status for a job whose status could not be queried
    pub fn pending(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            job_status: JobStatus::Running,
            job_result: JobResult::Pending,
            job_start: None,
            job_end: None,
            resource_uri: None,
            errors: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.job_status == JobStatus::Completed
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

// ============================================================================
// Resources
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "externalId")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    pub identity: Identity,
    #[serde(rename = "type")]
    pub product_type: String,
    #[serde(default)]
    pub alias: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerLeads {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    #[serde(rename = "product")]
    pub product_durable_id: String,
    #[serde(rename = "leadDestination")]
    pub destination: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDrive {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    #[serde(rename = "product")]
    pub product_durable_id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    #[serde(rename = "product")]
    pub product_durable_id: String,
    pub identity: Identity,
    #[serde(default)]
    pub alias: String,
    #[serde(rename = "azureRegions", default)]
    pub azure_regions: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductProperty {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    #[serde(rename = "product")]
    pub product_durable_id: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub terms_of_use: Option<String>,
    #[serde(default)]
    pub terms_conditions: Option<String>,
    #[serde(default)]
    pub categories: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    #[serde(rename = "product")]
    pub product_durable_id: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "searchResultSummary", default)]
    pub search_summary: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(rename = "privacyPolicyLink", default)]
    pub privacy_policy: String,
    #[serde(rename = "cloudSolutionProviderMarketingMaterials", default)]
    pub cspmm: Option<String>,
    #[serde(default)]
    pub support_contact: Option<Contact>,
    #[serde(default)]
    pub engineering_contact: Option<Contact>,
    #[serde(rename = "languageId", default)]
    pub language: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingAsset {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    #[serde(rename = "product")]
    pub product_durable_id: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(rename = "listing")]
    pub listing_durable_id: String,
    #[serde(rename = "type", default)]
    pub asset_type: String,
    #[serde(rename = "languageId", default)]
    pub language: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ListingAsset {
    pub fn listing_id(&self) -> &str {
        last_segment(&self.listing_durable_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanListing {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    #[serde(rename = "product")]
    pub product_durable_id: String,
    #[serde(rename = "plan")]
    pub plan_durable_id: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub summary: String,
    #[serde(rename = "languageId", default)]
    pub language: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audience {
    #[serde(rename = "type")]
    pub audience_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAndAvailabilityOffer {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    #[serde(rename = "product")]
    pub product_durable_id: String,
    #[serde(default)]
    pub preview_audiences: Vec<Audience>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorePricing {
    pub price_input_option: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_core: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_core_size: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub license_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_pricing: Option<CorePricing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAndAvailabilityPlan {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    #[serde(rename = "product")]
    pub product_durable_id: String,
    #[serde(rename = "plan")]
    pub plan_durable_id: String,
    #[serde(default)]
    pub visibility: String,
    #[serde(default)]
    pub markets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial: Option<Value>,
    #[serde(default)]
    pub software_reservation: Vec<Value>,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub private_audiences: Vec<Audience>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductReseller {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    #[serde(rename = "product")]
    pub product_durable_id: String,
    #[serde(default)]
    pub reseller_channel_state: String,
    #[serde(default)]
    pub audiences: Vec<Audience>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Publishing state of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSubmission {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    #[serde(rename = "product")]
    pub product_durable_id: String,
    pub target: PublishTarget,
    #[serde(default)]
    pub lifecycle_state: String,
    /// Submission job status (e.g. "running", "completed")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProductSubmission {
    pub fn target_type(&self) -> SubmissionTarget {
        self.target.target_type
    }

    pub fn is_running(&self) -> bool {
        self.status.as_deref() == Some("running")
    }
}

// ============================================================================
// Technical configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDetails {
    pub family: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(rename = "type")]
    pub os_type: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmiProperties {
    #[serde(default = "default_true")]
    pub supports_extensions: bool,
    #[serde(default)]
    pub supports_backup: bool,
    #[serde(default)]
    pub supports_accelerated_networking: bool,
    #[serde(default)]
    pub is_network_virtual_appliance: bool,
    #[serde(rename = "supportsNVMe", default)]
    pub supports_nvme: bool,
    #[serde(default)]
    pub supports_cloud_init: bool,
    #[serde(default)]
    pub supports_aad_login: bool,
    #[serde(default)]
    pub supports_hibernation: bool,
    #[serde(default = "default_true")]
    pub supports_remote_connection: bool,
    #[serde(default)]
    pub requires_custom_arm_template: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmiSku {
    #[serde(rename = "skuId")]
    pub id: String,
    #[serde(rename = "imageType")]
    pub image_type: String,
    #[serde(rename = "securityType", default, skip_serializing_if = "Option::is_none")]
    pub security_type: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsDiskUri {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmImageSource {
    pub source_type: String,
    pub os_disk: OsDiskUri,
    #[serde(default)]
    pub data_disks: Vec<Value>,
}

impl VmImageSource {
    /// Source pointing to a VHD through its SAS URI
    pub fn sas_uri(uri: &str) -> Self {
        Self {
            source_type: "sasUri".to_string(),
            os_disk: OsDiskUri { uri: uri.to_string() },
            data_disks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmImageDefinition {
    pub image_type: String,
    pub source: VmImageSource,
}

/// Lifecycle of a disk version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DiskLifecycleState {
    GenerallyAvailable,
    Deprecated,
    Deleted,
    Other(String),
}

impl DiskLifecycleState {
    /// Deprecated and deleted versions are rejected by the API when re-submitted
    pub fn is_retired(&self) -> bool {
        matches!(self, DiskLifecycleState::Deprecated | DiskLifecycleState::Deleted)
    }
}

impl From<String> for DiskLifecycleState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "generallyAvailable" => DiskLifecycleState::GenerallyAvailable,
            "deprecated" => DiskLifecycleState::Deprecated,
            "deleted" => DiskLifecycleState::Deleted,
            _ => DiskLifecycleState::Other(value),
        }
    }
}

impl From<DiskLifecycleState> for String {
    fn from(value: DiskLifecycleState) -> Self {
        match value {
            DiskLifecycleState::GenerallyAvailable => "generallyAvailable".to_string(),
            DiskLifecycleState::Deprecated => "deprecated".to_string(),
            DiskLifecycleState::Deleted => "deleted".to_string(),
            DiskLifecycleState::Other(other) => other,
        }
    }
}

/// Gen1/Gen2 images grouped under a version number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskVersion {
    pub version_number: String,
    #[serde(default)]
    pub vm_images: Vec<VmImageDefinition>,
    pub lifecycle_state: DiskLifecycleState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Technical configuration of a virtual machine plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmiPlanTechConfig {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "id")]
    pub durable_id: String,
    #[serde(rename = "product")]
    pub product_durable_id: String,
    #[serde(rename = "plan")]
    pub plan_durable_id: String,
    pub operating_system: OsDetails,
    #[serde(default)]
    pub recommended_vm_sizes: Vec<String>,
    #[serde(default)]
    pub open_ports: Vec<Value>,
    pub vm_properties: VmiProperties,
    #[serde(default)]
    pub skus: Vec<VmiSku>,
    #[serde(rename = "vmImageVersions", default)]
    pub disk_versions: Vec<DiskVersion>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

durable!(
    ProductSummary,
    CustomerLeads,
    TestDrive,
    PlanSummary,
    ProductProperty,
    Listing,
    ListingAsset,
    PlanListing,
    PriceAndAvailabilityOffer,
    PriceAndAvailabilityPlan,
    ProductReseller,
    ProductSubmission,
    VmiPlanTechConfig,
);

product_linked!(
    CustomerLeads,
    TestDrive,
    PlanSummary,
    ProductProperty,
    Listing,
    ListingAsset,
    PlanListing,
    PriceAndAvailabilityOffer,
    PriceAndAvailabilityPlan,
    ProductReseller,
    ProductSubmission,
    VmiPlanTechConfig,
);

plan_linked!(PlanListing, PriceAndAvailabilityPlan, VmiPlanTechConfig);

// ============================================================================
// Resource tree
// ============================================================================

/// Resource kinds, named after the first segment of their durable id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Product,
    CustomerLeads,
    TestDrive,
    Plan,
    Property,
    PlanListing,
    Listing,
    ListingAsset,
    PriceAndAvailabilityOffer,
    PriceAndAvailabilityPlan,
    TechConfig,
    Reseller,
    Submission,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 13] = [
        ResourceKind::Product,
        ResourceKind::CustomerLeads,
        ResourceKind::TestDrive,
        ResourceKind::Plan,
        ResourceKind::Property,
        ResourceKind::PlanListing,
        ResourceKind::Listing,
        ResourceKind::ListingAsset,
        ResourceKind::PriceAndAvailabilityOffer,
        ResourceKind::PriceAndAvailabilityPlan,
        ResourceKind::TechConfig,
        ResourceKind::Reseller,
        ResourceKind::Submission,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Product => "product",
            ResourceKind::CustomerLeads => "customer-leads",
            ResourceKind::TestDrive => "test-drive",
            ResourceKind::Plan => "plan",
            ResourceKind::Property => "property",
            ResourceKind::PlanListing => "plan-listing",
            ResourceKind::Listing => "listing",
            ResourceKind::ListingAsset => "listing-asset",
            ResourceKind::PriceAndAvailabilityOffer => "price-and-availability-offer",
            ResourceKind::PriceAndAvailabilityPlan => "price-and-availability-plan",
            ResourceKind::TechConfig => "virtual-machine-plan-technical-configuration",
            ResourceKind::Reseller => "reseller",
            ResourceKind::Submission => "submission",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<ResourceKind> {
        Self::ALL.into_iter().find(|k| k.as_str() == prefix)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any resource of a product's resource tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AzureResource {
    Product(ProductSummary),
    CustomerLeads(CustomerLeads),
    TestDrive(TestDrive),
    Plan(PlanSummary),
    Property(ProductProperty),
    PlanListing(PlanListing),
    Listing(Listing),
    ListingAsset(ListingAsset),
    PriceAndAvailabilityOffer(PriceAndAvailabilityOffer),
    PriceAndAvailabilityPlan(PriceAndAvailabilityPlan),
    TechConfig(VmiPlanTechConfig),
    Reseller(ProductReseller),
    Submission(ProductSubmission),
    /// Resource kind this library does not model
    Other(Value),
}

impl AzureResource {
    pub fn kind(&self) -> Option<ResourceKind> {
        let kind = match self {
            AzureResource::Product(_) => ResourceKind::Product,
            AzureResource::CustomerLeads(_) => ResourceKind::CustomerLeads,
            AzureResource::TestDrive(_) => ResourceKind::TestDrive,
            AzureResource::Plan(_) => ResourceKind::Plan,
            AzureResource::Property(_) => ResourceKind::Property,
            AzureResource::PlanListing(_) => ResourceKind::PlanListing,
            AzureResource::Listing(_) => ResourceKind::Listing,
            AzureResource::ListingAsset(_) => ResourceKind::ListingAsset,
            AzureResource::PriceAndAvailabilityOffer(_) => ResourceKind::PriceAndAvailabilityOffer,
            AzureResource::PriceAndAvailabilityPlan(_) => ResourceKind::PriceAndAvailabilityPlan,
            AzureResource::TechConfig(_) => ResourceKind::TechConfig,
            AzureResource::Reseller(_) => ResourceKind::Reseller,
            AzureResource::Submission(_) => ResourceKind::Submission,
            AzureResource::Other(_) => return None,
        };
        Some(kind)
    }

    pub fn durable_id(&self) -> Option<&str> {
        match self {
            AzureResource::Product(r) => Some(r.durable_id()),
            AzureResource::CustomerLeads(r) => Some(r.durable_id()),
            AzureResource::TestDrive(r) => Some(r.durable_id()),
            AzureResource::Plan(r) => Some(r.durable_id()),
            AzureResource::Property(r) => Some(r.durable_id()),
            AzureResource::PlanListing(r) => Some(r.durable_id()),
            AzureResource::Listing(r) => Some(r.durable_id()),
            AzureResource::ListingAsset(r) => Some(r.durable_id()),
            AzureResource::PriceAndAvailabilityOffer(r) => Some(r.durable_id()),
            AzureResource::PriceAndAvailabilityPlan(r) => Some(r.durable_id()),
            AzureResource::TechConfig(r) => Some(r.durable_id()),
            AzureResource::Reseller(r) => Some(r.durable_id()),
            AzureResource::Submission(r) => Some(r.durable_id()),
            AzureResource::Other(v) => v.get("id").and_then(Value::as_str),
        }
    }
}

impl<'de> Deserialize<'de> for AzureResource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let prefix = value
            .get("id")
            .and_then(Value::as_str)
            .map(first_segment)
            .ok_or_else(|| D::Error::missing_field("id"))?;

        let Some(kind) = ResourceKind::from_prefix(prefix) else {
            return Ok(AzureResource::Other(value));
        };

        let resource = match kind {
            ResourceKind::Product => serde_json::from_value(value).map(AzureResource::Product),
            ResourceKind::CustomerLeads => serde_json::from_value(value).map(AzureResource::CustomerLeads),
            ResourceKind::TestDrive => serde_json::from_value(value).map(AzureResource::TestDrive),
            ResourceKind::Plan => serde_json::from_value(value).map(AzureResource::Plan),
            ResourceKind::Property => serde_json::from_value(value).map(AzureResource::Property),
            ResourceKind::PlanListing => serde_json::from_value(value).map(AzureResource::PlanListing),
            ResourceKind::Listing => serde_json::from_value(value).map(AzureResource::Listing),
            ResourceKind::ListingAsset => serde_json::from_value(value).map(AzureResource::ListingAsset),
            ResourceKind::PriceAndAvailabilityOffer => {
                serde_json::from_value(value).map(AzureResource::PriceAndAvailabilityOffer)
            }
            ResourceKind::PriceAndAvailabilityPlan => {
                serde_json::from_value(value).map(AzureResource::PriceAndAvailabilityPlan)
            }
            ResourceKind::TechConfig => serde_json::from_value(value).map(AzureResource::TechConfig),
            ResourceKind::Reseller => serde_json::from_value(value).map(AzureResource::Reseller),
            ResourceKind::Submission => serde_json::from_value(value).map(AzureResource::Submission),
        };
        resource.map_err(|e| D::Error::custom(format!("invalid \"{}\" resource: {}", kind, e)))
    }
}

/// A product with every resource of its tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "root")]
    pub root_id: String,
    pub target: PublishTarget,
    #[serde(default)]
    pub resources: Vec<AzureResource>,
}

impl Product {
    pub fn id(&self) -> &str {
        last_segment(&self.root_id)
    }

    pub fn resource(&self) -> &str {
        first_segment(&self.root_id)
    }

    pub fn resources_of(&self, kind: ResourceKind) -> impl Iterator<Item = &AzureResource> {
        self.resources.iter().filter(move |r| r.kind() == Some(kind))
    }

    pub fn summaries(&self) -> impl Iterator<Item = &ProductSummary> {
        self.resources.iter().filter_map(|r| match r {
            AzureResource::Product(p) => Some(p),
            _ => None,
        })
    }

    pub fn plans(&self) -> impl Iterator<Item = &PlanSummary> {
        self.resources.iter().filter_map(|r| match r {
            AzureResource::Plan(p) => Some(p),
            _ => None,
        })
    }

    pub fn tech_configs(&self) -> impl Iterator<Item = &VmiPlanTechConfig> {
        self.resources.iter().filter_map(|r| match r {
            AzureResource::TechConfig(t) => Some(t),
            _ => None,
        })
    }

    pub fn submissions(&self) -> impl Iterator<Item = &ProductSubmission> {
        self.resources.iter().filter_map(|r| match r {
            AzureResource::Submission(s) => Some(s),
            _ => None,
        })
    }

    /// Replace the resource with the same durable id, or append it
    pub fn upsert_resource(&mut self, resource: AzureResource) {
        let existing = resource
            .durable_id()
            .and_then(|id| self.resources.iter().position(|r| r.durable_id() == Some(id)));
        match existing {
            Some(index) => self.resources[index] = resource,
            None => self.resources.push(resource),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tech_config_json() -> Value {
        json!({
            "$schema": "https://schema.mp.microsoft.com/schema/virtual-machine-plan-technical-configuration/2022-03-01-preview3",
            "id": "virtual-machine-plan-technical-configuration/ffffffff-ffff-ffff-ffff-ffffffffffff/aaaa",
            "product": "product/ffffffff-ffff-ffff-ffff-ffffffffffff",
            "plan": "plan/ffffffff-ffff-ffff-ffff-ffffffffffff/aaaa",
            "operatingSystem": {"family": "linux", "friendlyName": "Example", "type": "redHat"},
            "recommendedVmSizes": ["D2s_v3"],
            "openPorts": [],
            "vmProperties": {"supportsExtensions": true, "supportsNVMe": true, "futureFlag": 1},
            "skus": [{"imageType": "x64Gen2", "skuId": "plan1"}],
            "vmImageVersions": [{
                "versionNumber": "1.0.0",
                "vmImages": [{
                    "imageType": "x64Gen2",
                    "source": {
                        "sourceType": "sasUri",
                        "osDisk": {"uri": "https://foo.blob.core.windows.net/a.vhd"},
                        "dataDisks": []
                    }
                }],
                "lifecycleState": "generallyAvailable"
            }],
            "unknownField": "kept"
        })
    }

    #[test]
    fn test_durable_id_helpers() {
        let tc: VmiPlanTechConfig = serde_json::from_value(tech_config_json()).unwrap();
        assert_eq!(tc.id(), "aaaa");
        assert_eq!(tc.resource(), "virtual-machine-plan-technical-configuration");
        assert_eq!(tc.product_id(), "ffffffff-ffff-ffff-ffff-ffffffffffff");
        assert_eq!(tc.plan_id(), "aaaa");
        assert!(tc.vm_properties.supports_nvme);
        assert!(tc.vm_properties.supports_remote_connection);
    }

    #[test]
    fn test_tech_config_keeps_unknown_fields() {
        let tc: VmiPlanTechConfig = serde_json::from_value(tech_config_json()).unwrap();
        let encoded = serde_json::to_value(&tc).unwrap();
        assert_eq!(encoded["unknownField"], "kept");
        assert_eq!(encoded["vmProperties"]["futureFlag"], 1);
        assert_eq!(encoded["vmImageVersions"][0]["lifecycleState"], "generallyAvailable");
    }

    #[test]
    fn test_resource_dispatch_by_durable_id() {
        let product = json!({
            "$schema": "https://schema.mp.microsoft.com/schema/resource-tree/2022-03-01-preview2",
            "root": "product/ffffffff-ffff-ffff-ffff-ffffffffffff",
            "target": {"targetType": "preview"},
            "resources": [
                tech_config_json(),
                {
                    "$schema": "https://schema.mp.microsoft.com/schema/plan/2022-03-01-preview2",
                    "id": "plan/ffffffff-ffff-ffff-ffff-ffffffffffff/aaaa",
                    "product": "product/ffffffff-ffff-ffff-ffff-ffffffffffff",
                    "identity": {"externalId": "plan-1"},
                    "alias": "Plan 1",
                    "azureRegions": ["azureGlobal"]
                },
                {
                    "$schema": "https://schema.mp.microsoft.com/schema/brand-new/2025",
                    "id": "brand-new/123"
                }
            ]
        });

        let product: Product = serde_json::from_value(product).unwrap();
        assert_eq!(product.id(), "ffffffff-ffff-ffff-ffff-ffffffffffff");
        assert_eq!(product.target.target_type, SubmissionTarget::Preview);
        assert_eq!(product.tech_configs().count(), 1);
        assert_eq!(product.plans().next().unwrap().identity.name, "plan-1");
        assert_eq!(product.resources_of(ResourceKind::Plan).count(), 1);
        assert!(matches!(product.resources[2], AzureResource::Other(_)));
        assert_eq!(product.resources[2].durable_id(), Some("brand-new/123"));
    }

    #[test]
    fn test_submission_target_ordering() {
        assert!(SubmissionTarget::Draft < SubmissionTarget::Preview);
        assert!(SubmissionTarget::Preview < SubmissionTarget::Live);
        assert_eq!(SubmissionTarget::Live.previous(), SubmissionTarget::Preview);
        assert_eq!(SubmissionTarget::Preview.previous(), SubmissionTarget::Draft);
    }

    #[test]
    fn test_configure_status_parsing() {
        let status: ConfigureStatus = serde_json::from_value(json!({
            "jobId": "job-1",
            "jobStatus": "completed",
            "jobResult": "failed",
            "errors": [{"code": "invalidResource", "message": "Bad SKU"}]
        }))
        .unwrap();
        assert!(status.is_complete());
        assert_eq!(status.job_result, JobResult::Failed);
        assert_eq!(status.error_messages(), vec!["invalidResource: Bad SKU".to_string()]);
    }

    #[test]
    fn test_disk_lifecycle_state() {
        let state: DiskLifecycleState = serde_json::from_value(json!("deprecated")).unwrap();
        assert!(state.is_retired());
        let state: DiskLifecycleState = serde_json::from_value(json!("deprecationScheduled")).unwrap();
        assert_eq!(state, DiskLifecycleState::Other("deprecationScheduled".to_string()));
        assert_eq!(serde_json::to_value(&state).unwrap(), json!("deprecationScheduled"));
    }
}
