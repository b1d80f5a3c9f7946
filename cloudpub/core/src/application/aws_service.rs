// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! AWS Product Service
//!
//! Adds AMI versions to AWS Marketplace products and restricts the old ones
//! through the Marketplace Catalog API.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Implements aws_service

use crate::application::aws_versions::{
    compare_created, create_version_tree, get_restricted_major_versions, get_restricted_minor_versions,
    get_restricted_patch_versions, RestrictedVersions, PUBLIC_VISIBILITY,
};
use crate::application::polling::{poll_until, PollPolicy};
use crate::domain::aws::{
    parse_error_details, Change, ChangeSetIntent, ChangeSetRequest, EntityFilter, ErrorDetail,
    GroupedVersions, ListEntitiesRequest, ProductDeliveryOption, ProductDetailResponse,
    ProductVersionsResponse,
};
use crate::domain::catalog::{MarketplaceCatalog, AWS_MARKETPLACE_CATALOG};
use crate::domain::config::{AwsConfig, ChangeSetPollingConfig};
use crate::domain::error::{CloudPubError, Result};
use crate::domain::metadata::AwsVersionMetadata;
use crate::domain::publisher::Publisher;
use crate::infrastructure::aws::CatalogHttpClient;
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error, info};

const ERROR_LIST_TIMEOUT: Duration = Duration::from_secs(10);

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^https?://(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+(?:[A-Z]{2,6}\.?|[A-Z0-9-]{2,}\.?)|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?(?:/?|[/?]\S+)$",
        )
        .expect("invalid URL pattern")
    })
}

/// Whether a change set error message is a link to the actual error list
pub fn is_str_url(value: &str) -> bool {
    url_regex().is_match(value)
}

pub struct AwsProductService {
    catalog: Arc<dyn MarketplaceCatalog>,
    http: reqwest::Client,
    changeset_policy: PollPolicy,
}

impl AwsProductService {
    pub fn new(catalog: Arc<dyn MarketplaceCatalog>, polling: &ChangeSetPollingConfig) -> Self {
        Self {
            catalog,
            http: reqwest::Client::new(),
            changeset_policy: PollPolicy::fixed(polling.interval, polling.attempts),
        }
    }

    pub fn from_config(config: &AwsConfig) -> Result<Self> {
        let client = CatalogHttpClient::from_config(config)?;
        Ok(Self::new(Arc::new(client), &config.changeset_polling))
    }

    fn check_product_versions(details: &ProductDetailResponse) -> Result<()> {
        if details.versions.is_empty() {
            debug!("The details from the response are: {:?}", details);
            return Err(CloudPubError::NotFound("This product has no versions".to_string()));
        }
        Ok(())
    }

    pub async fn get_product_by_id(&self, entity_id: &str) -> Result<ProductDetailResponse> {
        let rsp = self
            .catalog
            .describe_entity(AWS_MARKETPLACE_CATALOG, entity_id)
            .await?;

        match rsp.parsed_details()? {
            Some(details) => Ok(details),
            None => {
                debug!("The response was: {:?}", rsp);
                Err(CloudPubError::NotFound(format!(
                    "No such product with EntityId: \"{}\"",
                    entity_id
                )))
            }
        }
    }

    /// Details of the only product named `product_name`
    pub async fn get_product_by_name(
        &self,
        marketplace_entity_type: &str,
        product_name: &str,
    ) -> Result<ProductDetailResponse> {
        let request = ListEntitiesRequest {
            catalog: AWS_MARKETPLACE_CATALOG.to_string(),
            entity_type: marketplace_entity_type.to_string(),
            filter_list: vec![EntityFilter {
                name: "Name".to_string(),
                value_list: vec![product_name.to_string()],
            }],
            next_token: None,
        };
        let rsp = self.catalog.list_entities(&request).await?;

        match rsp.entity_summary_list.as_slice() {
            [] => {
                debug!("The response was: {:?}", rsp);
                Err(CloudPubError::NotFound(format!("No such product with name \"{}\"", product_name)))
            }
            [summary] => match summary.entity_id.as_deref() {
                Some(entity_id) => self.get_product_by_id(entity_id).await,
                None => Err(CloudPubError::NotFound(format!(
                    "No such product with name \"{}\"",
                    product_name
                ))),
            },
            _ => {
                debug!("The response was: {:?}", rsp);
                Err(CloudPubError::InvalidState(format!(
                    "Multiple responses found for \"{}\"",
                    product_name
                )))
            }
        }
    }

    /// Version owning the delivery option `version_id`
    pub async fn get_product_version_details(
        &self,
        entity_id: &str,
        version_id: &str,
    ) -> Result<ProductVersionsResponse> {
        let details = self.get_product_by_id(entity_id).await?;
        Self::check_product_versions(&details)?;

        details
            .versions
            .into_iter()
            .find(|v| v.delivery_options.iter().any(|d| d.id == version_id))
            .ok_or_else(|| CloudPubError::NotFound(format!("No such version with id \"{}\"", version_id)))
    }

    /// Every version of the product with its delivery options and AMIs
    pub async fn get_product_versions(&self, entity_id: &str) -> Result<Vec<GroupedVersions>> {
        let details = self.get_product_by_id(entity_id).await?;
        Self::check_product_versions(&details)?;

        Ok(details
            .versions
            .iter()
            .map(|v| GroupedVersions {
                title: v.version_title.clone(),
                delivery_options: v.delivery_options.clone(),
                created_date: v.creation_date.clone(),
                ami_ids: v.ami_ids(),
            })
            .collect())
    }

    /// First delivery option of the version titled `version_name`
    pub async fn get_product_version_by_name(
        &self,
        entity_id: &str,
        version_name: &str,
    ) -> Result<ProductDeliveryOption> {
        let details = self.get_product_by_id(entity_id).await?;
        Self::check_product_versions(&details)?;

        details
            .versions
            .into_iter()
            .find(|v| v.version_title == version_name)
            .and_then(|v| v.delivery_options.into_iter().next())
            .ok_or_else(|| CloudPubError::NotFound(format!("No such version with name \"{}\"", version_name)))
    }

    /// Start a change set restricting the given delivery options
    pub async fn set_restrict_versions(
        &self,
        entity_id: &str,
        marketplace_entity_type: &str,
        delivery_option_ids: &[String],
    ) -> Result<String> {
        let request = ChangeSetRequest {
            catalog: AWS_MARKETPLACE_CATALOG.to_string(),
            change_set: vec![Change::new(
                "RestrictDeliveryOptions",
                marketplace_entity_type,
                entity_id,
                json!({ "DeliveryOptionIds": delivery_option_ids }),
            )],
            intent: None,
        };
        let rsp = self.catalog.start_change_set(&request).await?;
        debug!("The response from the restrict version was: {:?}", rsp);
        Ok(rsp.change_set_id)
    }

    pub async fn cancel_change_set(&self, change_set_id: &str) -> Result<String> {
        let rsp = self
            .catalog
            .cancel_change_set(AWS_MARKETPLACE_CATALOG, change_set_id)
            .await?;
        debug!("The response from cancelling a changeset was: {:?}", rsp);
        Ok(rsp.change_set_id)
    }

    async fn fetch_error_list(&self, url: &str) -> Result<Vec<ErrorDetail>> {
        debug!("Fetching the change set errors from {}", url);
        let body = self
            .http
            .get(url)
            .timeout(ERROR_LIST_TIMEOUT)
            .send()
            .await
            .map_err(|e| CloudPubError::Network(format!("Failed to fetch {}: {}", url, e)))?
            .text()
            .await
            .map_err(|e| CloudPubError::Network(format!("Failed to read {}: {}", url, e)))?;
        parse_error_details(&body)
    }

    /// Replace the error messages which are links by the errors they point to
    async fn expand_error_details(&self, errors: Vec<ErrorDetail>) -> Result<Vec<ErrorDetail>> {
        let mut expanded = Vec::with_capacity(errors.len());
        for detail in errors {
            if is_str_url(&detail.error_message) {
                expanded.extend(self.fetch_error_list(&detail.error_message).await?);
            } else {
                expanded.push(detail);
            }
        }
        Ok(expanded)
    }

    /// Status of the change set; a failed change set is an error
    pub async fn check_publish_status(&self, change_set_id: &str) -> Result<String> {
        let rsp = self
            .catalog
            .describe_change_set(AWS_MARKETPLACE_CATALOG, change_set_id)
            .await?;
        info!("Publishing status is {}.", rsp.status);

        if rsp.status.eq_ignore_ascii_case("failed") {
            debug!("The response from the status was: {:?}", rsp);
            let errors = self.expand_error_details(rsp.error_details()).await?;
            let err = CloudPubError::ChangeSetFailed {
                change_set_id: change_set_id.to_string(),
                failure_code: rsp.failure_code.clone().unwrap_or_default(),
                errors,
            };
            error!("{}", err);
            return Err(err);
        }
        Ok(rsp.status)
    }

    /// Poll the change set until it succeeds
    pub async fn wait_for_changeset(&self, change_set_id: &str) -> Result<()> {
        poll_until(
            &self.changeset_policy,
            change_set_id,
            || self.check_publish_status(change_set_id),
            |status| status.eq_ignore_ascii_case("succeeded"),
        )
        .await?;
        Ok(())
    }

    pub async fn start_image_scan(&self, ami_id: &str) -> Result<String> {
        Err(CloudPubError::Unsupported(format!("Image scan of {}", ami_id)))
    }

    pub async fn check_image_scan(&self, ami_id: &str) -> Result<bool> {
        Err(CloudPubError::Unsupported(format!("Image scan status of {}", ami_id)))
    }

    async fn apply_restriction(
        &self,
        entity_id: &str,
        marketplace_entity_type: &str,
        restricted: RestrictedVersions,
    ) -> Result<Vec<String>> {
        if restricted.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            "Restricting these version(s) with id(s): {:?}",
            restricted.delivery_option_ids
        );
        let change_id = self
            .set_restrict_versions(entity_id, marketplace_entity_type, &restricted.delivery_option_ids)
            .await?;
        self.wait_for_changeset(&change_id).await?;
        Ok(restricted.ami_ids)
    }

    /// Restrict the public versions whose title contains `restrict_version`,
    /// except the newest one. Returns the AMI ids of the restricted versions.
    pub async fn restrict_minor_versions(
        &self,
        entity_id: &str,
        marketplace_entity_type: &str,
        restrict_version: &str,
    ) -> Result<Vec<String>> {
        let versions = self.get_product_versions(entity_id).await?;
        let matching: Vec<&GroupedVersions> = versions
            .iter()
            .filter(|v| v.title.contains(restrict_version))
            .collect();

        let Some(newest) = matching
            .iter()
            .map(|v| v.created_date.as_str())
            .max_by(|a, b| compare_created(a, b))
        else {
            return Ok(Vec::new());
        };

        let mut restricted = RestrictedVersions::default();
        for version in matching.iter().filter(|v| v.created_date != newest) {
            for option in version.delivery_options.iter().filter(|d| d.visibility == PUBLIC_VISIBILITY) {
                restricted.delivery_option_ids.push(option.id.clone());
                restricted.ami_ids.extend(version.ami_ids.iter().cloned());
            }
        }

        self.apply_restriction(entity_id, marketplace_entity_type, restricted)
            .await
    }

    /// Keep the newest `restrict_major` major releases, the newest
    /// `restrict_minor` minor releases of each and the newest patch of each
    /// minor release. Returns the AMI ids of the restricted versions.
    pub async fn restrict_versions(
        &self,
        entity_id: &str,
        marketplace_entity_type: &str,
        restrict_major: Option<usize>,
        restrict_minor: Option<usize>,
    ) -> Result<Vec<String>> {
        let versions = self.get_product_versions(entity_id).await?;
        let mut tree = create_version_tree(&versions);
        let mut restricted = RestrictedVersions::default();

        if let Some(keep) = restrict_major {
            restricted.extend(get_restricted_major_versions(&mut tree, keep));
        }
        if let Some(keep) = restrict_minor {
            restricted.extend(get_restricted_minor_versions(&mut tree, keep));
        }
        restricted.extend(get_restricted_patch_versions(&tree));

        self.apply_restriction(entity_id, marketplace_entity_type, restricted)
            .await
    }
}

#[async_trait]
impl Publisher for AwsProductService {
    type Metadata = AwsVersionMetadata;

    /// Add a new version to an existing product, or replace the delivery
    /// options of the version with the same title when overwriting.
    async fn publish(&self, metadata: &AwsVersionMetadata) -> Result<()> {
        let entity_id = &metadata.base.destination;
        if metadata.base.keepdraft || metadata.preview_only {
            info!("Keeping the new version of \"{}\" as a draft, nothing to submit", entity_id);
            return Ok(());
        }

        let mut mapping = metadata.version_mapping.clone();

        let change_type = if metadata.base.overwrite {
            let existing = self
                .get_product_version_by_name(entity_id, &mapping.version.version_title)
                .await?;
            let first = mapping.delivery_options.first_mut().ok_or_else(|| {
                CloudPubError::InvalidInput("The version mapping has no delivery options".to_string())
            })?;
            first.id = Some(existing.id);
            "UpdateDeliveryOptions"
        } else {
            mapping.delivery_options.iter_mut().for_each(|d| d.id = None);
            "AddDeliveryOptions"
        };

        let request = ChangeSetRequest {
            catalog: AWS_MARKETPLACE_CATALOG.to_string(),
            change_set: vec![Change::new(
                change_type,
                &metadata.marketplace_entity_type,
                entity_id,
                serde_json::to_value(&mapping)?,
            )],
            intent: Some(ChangeSetIntent::Apply),
        };

        let rsp = self.catalog.start_change_set(&request).await?;
        debug!("The response from publishing was: {:?}", rsp);

        self.wait_for_changeset(&rsp.change_set_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_str_url() {
        assert!(is_str_url("https://errors.example.com/changeset/1.json"));
        assert!(is_str_url("http://127.0.0.1:8080/errors"));
        assert!(!is_str_url("The AMI could not be scanned"));
        assert!(!is_str_url("ftp://example.com/errors"));
    }
}
