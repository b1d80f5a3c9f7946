// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Azure Service
//!
//! Publishes VHD images into Azure Marketplace virtual machine offers through
//! the Product Ingestion API.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Implements azure_service
//!
//! # Publishing Flow
//!
//! 1. Resolve the `product/plan` destination
//! 2. Look for the SAS URI in the live, preview and draft technical configurations
//! 3. When missing, merge it into a disk version, update the SKUs and configure the plan
//! 4. Unless `keepdraft`, submit the product to preview and then to live,
//!    skipping the targets the image already reached

use crate::application::azure_reconcile::{
    create_disk_version_from_scratch, filter_deprecated_disk_versions, is_sas_present,
    seek_disk_version, set_new_sas_disk_version, update_skus, SasFoundStatus, TechConfigLookup,
};
use crate::application::offer_diff::{azure_excludes, diff_json, OfferDiff};
use crate::application::polling::{poll_until, retry_async, PollPolicy};
use crate::domain::azure::{
    AzureResource, ConfigureStatus, DurableResource, JobResult, PlanLinked, PlanSummary, Product,
    ProductLinked, ProductSubmission, ProductSummary, ResourceKind, SubmissionTarget, VmImageSource,
    VmiPlanTechConfig,
};
use crate::domain::config::{AttemptConfig, AzureConfig};
use crate::domain::error::{CloudPubError, Result};
use crate::domain::metadata::AzurePublishingMetadata;
use crate::domain::publisher::Publisher;
use crate::infrastructure::azure::PartnerPortalSession;
use crate::infrastructure::http::{assert_dict, get_link_params, raise_for_status, read_json};
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

pub const CONFIGURE_SCHEMA_PREFIX: &str = "https://schema.mp.microsoft.com/schema/configure";

pub struct AzureService {
    session: PartnerPortalSession,
    api_version: String,
    job_policy: PollPolicy,
    publish_lock_policy: PollPolicy,
    publish_retry: AttemptConfig,
    diff_excludes: Vec<Regex>,
    products: Mutex<Option<Vec<ProductSummary>>>,
}

impl AzureService {
    pub fn new(config: &AzureConfig) -> Result<Self> {
        let session = PartnerPortalSession::from_config(config)?;
        Self::with_session(session, config)
    }

    pub fn with_session(session: PartnerPortalSession, config: &AzureConfig) -> Result<Self> {
        Ok(Self {
            session,
            api_version: config.api_version.clone(),
            job_policy: PollPolicy::try_from(&config.job_polling)?,
            publish_lock_policy: PollPolicy::try_from(&config.publish_lock_polling)?,
            publish_retry: config.publish_retry.clone(),
            diff_excludes: azure_excludes(),
            products: Mutex::new(None),
        })
    }

    async fn get_dict(&self, path: &str, params: &[(String, String)]) -> Result<Value> {
        let response = self.session.get(path, params).await?;
        let response = raise_for_status(response).await?;
        Ok(Value::Object(assert_dict(read_json(response).await?)?))
    }

    async fn configure_request(&self, data: &Value) -> Result<ConfigureStatus> {
        debug!("Received the following data to create/modify: {}", data);
        let response = self.session.post("configure", data).await?;
        let response = raise_for_status(response).await?;
        let body = assert_dict(read_json(response).await?)?;
        debug!("Create/modify request response: {:?}", body);
        Ok(serde_json::from_value(Value::Object(body))?)
    }

    /// Current status of a `configure` job.
    ///
    /// Server errors are reported as a pending job so that polling carries on.
    pub async fn query_job_details(&self, job_id: &str) -> Result<ConfigureStatus> {
        debug!("Query job details for \"{}\"", job_id);
        let response = self.session.get(&format!("configure/{}/status", job_id), &[]).await?;

        if response.status().is_server_error() {
            warn!(
                "Got HTTP {} from server when querying job {} status. Considering the job as pending.",
                response.status().as_u16(),
                job_id
            );
            return Ok(ConfigureStatus::pending(job_id));
        }

        let response = raise_for_status(response).await?;
        let status: ConfigureStatus = serde_json::from_value(read_json(response).await?)?;
        debug!("Query Job details response: {:?}", status);
        Ok(status)
    }

    /// Wait until the job is completed; a failed or cancelled job is an error
    pub async fn wait_for_job_completion(&self, job_id: &str) -> Result<ConfigureStatus> {
        let status = poll_until(
            &self.job_policy,
            &format!("job {}", job_id),
            || self.query_job_details(job_id),
            ConfigureStatus::is_complete,
        )
        .await?;

        match status.job_result {
            JobResult::Failed | JobResult::Cancelled => {
                let err = CloudPubError::JobFailed {
                    job_id: job_id.to_string(),
                    result: status.job_result.to_string(),
                    errors: status.error_messages(),
                };
                error!("{}", err);
                Err(err)
            }
            _ => {
                debug!("Job {} succeeded", job_id);
                Ok(status)
            }
        }
    }

    /// Create or update resources and wait until the job is done
    pub async fn configure(&self, resources: &[AzureResource]) -> Result<ConfigureStatus> {
        let data = json!({
            "$schema": format!("{}/{}", CONFIGURE_SCHEMA_PREFIX, self.api_version),
            "resources": resources,
        });
        let status = self.configure_request(&data).await?;
        self.wait_for_job_completion(&status.job_id).await
    }

    /// All products of the seller, following `@nextLink` pages
    pub async fn products(&self) -> Result<Vec<ProductSummary>> {
        let mut products = Vec::new();
        let mut params: Vec<(String, String)> = Vec::new();

        loop {
            info!("Requesting the products list.");
            let data = self.get_dict("/product", &params).await?;

            let values = match data.get("value") {
                None => Vec::new(),
                Some(Value::Array(values)) => values.clone(),
                Some(other) => {
                    return Err(CloudPubError::UnexpectedType(format!(
                        "Expected response.values to contain a list, got {}.",
                        other
                    )))
                }
            };
            for value in values {
                products.push(serde_json::from_value(value)?);
            }

            // nextLink may be relative to the API prefix
            params = match data.get("@nextLink").and_then(Value::as_str) {
                Some(link) => get_link_params(self.session.prefix_url(), link)?,
                None => Vec::new(),
            };
            if params.is_empty() {
                return Ok(products);
            }
        }
    }

    /// Products of the seller, fetched once per service
    pub async fn list_products(&self) -> Result<Vec<ProductSummary>> {
        info!("Listing the products on Azure server.");
        if let Some(cached) = self.products.lock().clone() {
            return Ok(cached);
        }
        let products = self.products().await?;
        *self.products.lock() = Some(products.clone());
        Ok(products)
    }

    pub async fn get_productid(&self, product_name: &str) -> Result<String> {
        self.list_products()
            .await?
            .iter()
            .find(|p| p.identity.name == product_name)
            .map(|p| p.id().to_string())
            .ok_or_else(|| CloudPubError::NotFound(format!("No such product with name \"{}\"", product_name)))
    }

    pub async fn get_product(&self, product_id: &str, target: SubmissionTarget) -> Result<Product> {
        info!("Requesting the product ID \"{}\" with state \"{}\".", product_id, target);
        let params = [("targetType".to_string(), target.to_string())];
        let product = async {
            let data = self
                .get_dict(&format!("/resource-tree/product/{}", product_id), &params)
                .await?;
            Ok::<Product, CloudPubError>(serde_json::from_value(data)?)
        }
        .await;

        product.map_err(|e| match e {
            CloudPubError::Http { .. }
            | CloudPubError::NotFound(_)
            | CloudPubError::UnexpectedType(_)
            | CloudPubError::Decode(_) => {
                debug!("Couldn't find the product \"{}\" with state \"{}\": {}", product_id, target, e);
                CloudPubError::NotFound(format!("No such product with id \"{}\"", product_id))
            }
            other => other,
        })
    }

    pub async fn get_product_by_name(&self, product_name: &str, target: SubmissionTarget) -> Result<Product> {
        for product in self.products().await? {
            if product.identity.name == product_name {
                debug!("Product alias \"{}\" has the ID \"{}\"", product_name, product.id());
                return self.get_product(product.id(), target).await;
            }
        }
        Err(CloudPubError::NotFound(format!(
            "No such product with name \"{}\"",
            product_name
        )))
    }

    pub async fn get_submissions(&self, product_id: &str) -> Result<Vec<ProductSubmission>> {
        debug!("Requesting the submissions for product \"{}\".", product_id);
        let data = self.get_dict(&format!("/submission/{}", product_id), &[]).await?;
        let values = data.get("value").cloned().unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::from_value(values)?)
    }

    pub async fn get_submission_state(
        &self,
        product_id: &str,
        target: SubmissionTarget,
    ) -> Result<Option<ProductSubmission>> {
        info!("Looking up for submission in state \"{}\" for \"{}\"", target, product_id);
        Ok(self
            .get_submissions(product_id)
            .await?
            .into_iter()
            .find(|s| s.target_type() == target))
    }

    pub fn filter_product_resources<'a>(&self, product: &'a Product, kind: ResourceKind) -> Vec<&'a AzureResource> {
        debug!("Filtering the resource \"{}\" for product ID \"{}\"", kind, product.id());
        product.resources_of(kind).collect()
    }

    pub fn get_plan_by_name(&self, product: &Product, plan_name: &str) -> Result<PlanSummary> {
        product
            .plans()
            .find(|p| p.identity.name == plan_name)
            .inspect(|p| debug!("Plan alias \"{}\" has the ID \"{}\"", plan_name, p.id()))
            .cloned()
            .ok_or_else(|| CloudPubError::NotFound(format!("No such plan with name \"{}\"", plan_name)))
    }

    pub async fn get_product_plan_by_name(
        &self,
        product_name: &str,
        plan_name: &str,
        target: SubmissionTarget,
    ) -> Result<(Product, PlanSummary)> {
        let found = async {
            let product = self.get_product_by_name(product_name, target).await?;
            let plan = self.get_plan_by_name(&product, plan_name)?;
            Ok::<_, CloudPubError>((product, plan))
        }
        .await;

        found.map_err(|e| match e {
            CloudPubError::NotFound(_) => CloudPubError::NotFound(format!(
                "No such plan with name \"{} for {}\"",
                plan_name, product_name
            )),
            other => other,
        })
    }

    /// Difference between the remote product and the local one
    pub async fn diff_offer(&self, product: &Product, target: SubmissionTarget) -> Result<OfferDiff> {
        let remote = self.get_product(product.id(), target).await?;
        Ok(diff_json(
            &serde_json::to_value(&remote)?,
            &serde_json::to_value(product)?,
            &self.diff_excludes,
        ))
    }

    /// Move the product submission to `status`, optionally with extra resources (modular push)
    pub async fn submit_to_status(
        &self,
        product_id: &str,
        status: SubmissionTarget,
        resources: Option<&[AzureResource]>,
    ) -> Result<ConfigureStatus> {
        info!("Submitting the status of \"{}\" to \"{}\"", product_id, status);
        let prev_state = status.previous();

        let mut submission = self
            .get_submission_state(product_id, prev_state)
            .await?
            .ok_or_else(|| {
                CloudPubError::InvalidState(format!(
                    "Could not find the submission state \"{}\" for product \"{}\"",
                    prev_state, product_id
                ))
            })?;
        submission.target.target_type = status;

        let mut cfg_res: Vec<AzureResource> = Vec::new();
        if let Some(resources) = resources.filter(|r| !r.is_empty()) {
            info!("Performing a modular push to \"{}\" for \"{}\"", status, product_id);
            cfg_res.extend_from_slice(resources);
        }
        cfg_res.push(AzureResource::Submission(submission));
        self.configure(&cfg_res).await
    }

    async fn running_submission(&self, product_id: &str) -> Result<Option<SubmissionTarget>> {
        for target in [SubmissionTarget::Preview, SubmissionTarget::Live] {
            let sub = self.get_submission_state(product_id, target).await?;
            if sub.is_some_and(|s| s.is_running()) {
                info!("The offer {} is already being published to {}", product_id, target);
                return Ok(Some(target));
            }
        }
        Ok(None)
    }

    /// Wait while a preview or live submission of the product is running
    pub async fn ensure_can_publish(&self, product_id: &str) -> Result<()> {
        info!("Ensuring no other publishing jobs are in progress for \"{}\"", product_id);

        let running = poll_until(
            &self.publish_lock_policy,
            &format!("the running submissions of {}", product_id),
            || self.running_submission(product_id),
            Option::is_none,
        )
        .await;

        match running {
            Ok(_) => Ok(()),
            Err(CloudPubError::Timeout(_)) => Err(CloudPubError::InvalidState(format!(
                "The offer {} is already being published",
                product_id
            ))),
            Err(e) => Err(e),
        }
    }

    pub fn get_plan_tech_config(&self, product: &Product, plan: &PlanSummary) -> Result<VmiPlanTechConfig> {
        debug!("Retrieving the plan \"{}\" technical configuration.", plan.id());
        product
            .tech_configs()
            .find(|tc| tc.plan_id() == plan.id())
            .cloned()
            .ok_or_else(|| {
                CloudPubError::NotFound(format!(
                    "No technical configuration found for plan \"{}\"",
                    plan.id()
                ))
            })
    }

    /// Product and plan resources alongside the updated technical configuration.
    ///
    /// Product level details (listings, availability, reseller...) are not
    /// required for a modular publish.
    pub fn get_modular_resources_to_publish(
        &self,
        product: &Product,
        tech_config: &VmiPlanTechConfig,
    ) -> Result<Vec<AzureResource>> {
        let product_res = product
            .summaries()
            .find(|p| p.id() == tech_config.product_id())
            .cloned()
            .ok_or_else(|| {
                CloudPubError::NotFound(format!("No such product with id \"{}\"", tech_config.product_id()))
            })?;
        let plan_res = product
            .plans()
            .find(|p| p.id() == tech_config.plan_id())
            .cloned()
            .ok_or_else(|| CloudPubError::NotFound(format!("No such plan with id \"{}\"", tech_config.plan_id())))?;

        Ok(vec![
            AzureResource::Product(product_res),
            AzureResource::Plan(plan_res),
            AzureResource::TechConfig(tech_config.clone()),
        ])
    }

    /// Existing submission targets in lookup order: live, preview, draft
    pub async fn compute_targets(&self, product_id: &str) -> Result<Vec<SubmissionTarget>> {
        let existing: Vec<SubmissionTarget> = self
            .get_submissions(product_id)
            .await?
            .iter()
            .map(ProductSubmission::target_type)
            .collect();
        Ok(SubmissionTarget::lookup_order()
            .into_iter()
            .filter(|t| existing.contains(t))
            .collect())
    }

    /// Whether the latest submission is in preview and not yet live
    pub async fn is_submission_in_preview(&self, current: &ProductSubmission) -> Result<bool> {
        if current.target_type() != SubmissionTarget::Preview {
            return Ok(false);
        }
        match self.get_submission_state(current.product_id(), SubmissionTarget::Live).await? {
            Some(live) => Ok(current.id() != live.id()),
            None => Ok(true),
        }
    }

    async fn publish_to_once(
        &self,
        product: &Product,
        product_name: &str,
        target: SubmissionTarget,
        resources: Option<&[AzureResource]>,
    ) -> Result<()> {
        let res = self.submit_to_status(product.id(), target, resources).await?;
        let reached = self.get_submission_state(product.id(), target).await?.is_some();

        if res.job_result != JobResult::Succeeded || !reached {
            let msg = format!(
                "Failed to submit the product {} ({}) to {}. Status: {} Errors: {}",
                product_name,
                product.id(),
                target,
                res.job_result,
                res.error_messages().join("\n")
            );
            error!("{}", msg);
            return Err(CloudPubError::InvalidState(msg));
        }
        Ok(())
    }

    async fn publish_to(
        &self,
        product: &Product,
        product_name: &str,
        target: SubmissionTarget,
        resources: Option<&[AzureResource]>,
    ) -> Result<()> {
        retry_async(
            self.publish_retry.attempts,
            self.publish_retry.wait,
            &format!("Publishing {} to {}", product_name, target),
            || self.publish_to_once(product, product_name, target, resources),
        )
        .await
    }

    /// Submit the product to preview, which runs the marketplace validation
    pub async fn publish_preview(
        &self,
        product: &Product,
        product_name: &str,
        resources: Option<&[AzureResource]>,
    ) -> Result<()> {
        self.publish_to(product, product_name, SubmissionTarget::Preview, resources)
            .await
    }

    /// Submit the product to live; it must already be in preview
    pub async fn publish_live(&self, product: &Product, product_name: &str) -> Result<()> {
        self.publish_to(product, product_name, SubmissionTarget::Live, None).await
    }

    async fn overwrite_disk_version(
        &self,
        metadata: &AzurePublishingMetadata,
        source: &VmImageSource,
        target: SubmissionTarget,
    ) -> Result<TechConfigLookup> {
        let (product, plan) = self
            .get_product_plan_by_name(metadata.product_name(), metadata.plan_name(), target)
            .await?;
        warn!(
            "Overwriting the plan \"{}\" on \"{}\" with the given image: \"{}\".",
            metadata.plan_name(),
            target,
            metadata.base.image_path
        );
        let mut tech_config = self.get_plan_tech_config(&product, &plan)?;
        tech_config.disk_versions = vec![create_disk_version_from_scratch(metadata, source)];

        Ok(TechConfigLookup {
            tech_config,
            sas_found: false,
            product,
            plan,
            target,
        })
    }

    async fn look_up_sas_on_technical_config(
        &self,
        metadata: &AzurePublishingMetadata,
        target: SubmissionTarget,
    ) -> Result<TechConfigLookup> {
        let (product, plan) = self
            .get_product_plan_by_name(metadata.product_name(), metadata.plan_name(), target)
            .await?;
        info!(
            "Retrieving the technical config for \"{}\" on \"{}\".",
            metadata.base.destination, target
        );
        let tech_config = self.get_plan_tech_config(&product, &plan)?;
        let sas_found = is_sas_present(&tech_config, &metadata.base.image_path, metadata.check_base_sas_only);
        if sas_found {
            info!(
                "The destination \"{}\" on \"{}\" already contains the SAS URI: \"{}\".",
                metadata.base.destination, target, metadata.base.image_path
            );
        }

        Ok(TechConfigLookup {
            tech_config,
            sas_found,
            product,
            plan,
            target,
        })
    }

    fn create_or_update_disk_version(
        lookup: &mut TechConfigLookup,
        metadata: &AzurePublishingMetadata,
        source: &VmImageSource,
    ) -> Result<()> {
        match seek_disk_version(&mut lookup.tech_config, &metadata.disk_version) {
            Some(disk_version) => {
                info!(
                    "DiskVersion \"{}\" exists in \"{}\" on \"{}\" for the image \"{}\".",
                    disk_version.version_number, metadata.base.destination, lookup.target, metadata.base.image_path
                );
                set_new_sas_disk_version(disk_version, metadata, source)
            }
            None => {
                info!("The DiskVersion doesn't exist, creating one from scratch.");
                lookup
                    .tech_config
                    .disk_versions
                    .push(create_disk_version_from_scratch(metadata, source));
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Publisher for AzureService {
    type Metadata = AzurePublishingMetadata;

    /// Associate a VHD with the `product/plan` destination and publish it if required
    async fn publish(&self, metadata: &AzurePublishingMetadata) -> Result<()> {
        let product_name = metadata.product_name();
        let plan_name = metadata.plan_name();
        let product_id = self.get_productid(product_name).await?;
        let mut sas_in_target = SasFoundStatus::Missing;
        info!(
            "Preparing to associate the image \"{}\" with the plan \"{}\" from product \"{}\"",
            metadata.base.image_path, plan_name, product_name
        );

        info!("Creating the VMImageResource with SAS for image: \"{}\"", metadata.base.image_path);
        let source = VmImageSource::sas_uri(&metadata.base.image_path);

        let mut lookup = if metadata.base.overwrite {
            self.overwrite_disk_version(metadata, &source, SubmissionTarget::Draft)
                .await?
        } else {
            let mut last = None;
            for target in self.compute_targets(&product_id).await? {
                let found = self.look_up_sas_on_technical_config(metadata, target).await?;
                let sas_found = found.sas_found;
                last = Some(found);
                if sas_found {
                    sas_in_target = SasFoundStatus::from(target);
                    break;
                }
            }
            let mut lookup = last.ok_or_else(|| {
                CloudPubError::InvalidState(format!("No submissions found for product \"{}\"", product_id))
            })?;

            if sas_in_target == SasFoundStatus::Missing {
                info!(
                    "Scanning the disk versions from \"{}\" on \"{}\" for the image \"{}\"",
                    metadata.base.destination, lookup.target, metadata.base.image_path
                );
                Self::create_or_update_disk_version(&mut lookup, metadata, &source)?;
            }
            lookup
        };
        let target = lookup.target;

        if sas_in_target == SasFoundStatus::Missing {
            info!("Updating SKUs for \"{}\" on \"{}\".", metadata.base.destination, target);
            let tech_config = &mut lookup.tech_config;
            tech_config.skus = update_skus(
                &tech_config.disk_versions,
                metadata.generation,
                plan_name,
                &tech_config.skus,
            );
            filter_deprecated_disk_versions(tech_config);

            info!(
                "Updating the technical configuration for \"{}\" on \"{}\".",
                metadata.base.destination, target
            );
            self.configure(&[AzureResource::TechConfig(tech_config.clone())])
                .await?;
            lookup
                .product
                .upsert_resource(AzureResource::TechConfig(lookup.tech_config.clone()));
        }

        if !metadata.base.keepdraft {
            let product = &lookup.product;
            let submission = product.submissions().next().cloned().ok_or_else(|| {
                CloudPubError::InvalidState(format!("No submission found for product \"{}\"", product.id()))
            })?;

            // Only publish new changes or an offer already waiting in preview
            if sas_in_target <= SasFoundStatus::Draft || self.is_submission_in_preview(&submission).await? {
                info!("Publishing the new changes for \"{}\" on plan \"{}\"", product_name, plan_name);
                let diff = self.diff_offer(product, target).await?;
                if !diff.is_empty() {
                    warn!("Found the following offer diff before publishing:\n{}", diff.pretty());
                }
                self.ensure_can_publish(product.id()).await?;

                let modular_resources = if metadata.modular_push {
                    Some(self.get_modular_resources_to_publish(product, &lookup.tech_config)?)
                } else {
                    None
                };
                if sas_in_target < SasFoundStatus::Preview {
                    self.publish_preview(product, product_name, modular_resources.as_deref())
                        .await?;
                }
                if sas_in_target < SasFoundStatus::Live {
                    self.publish_live(product, product_name).await?;
                }
            }
        }

        info!(
            "Finished publishing the image \"{}\" to \"{}\"",
            metadata.base.image_path, metadata.base.destination
        );
        Ok(())
    }
}
