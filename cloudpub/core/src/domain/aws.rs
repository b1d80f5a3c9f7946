// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Aws
//!
//! JSON models of the AWS Marketplace Catalog API.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements aws

use crate::domain::error::{CloudPubError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// Version submission (AddDeliveryOptions / UpdateDeliveryOptions)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Version {
    pub version_title: String,
    pub release_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AmiSource {
    pub ami_id: String,
    pub access_role_arn: String,
    pub user_name: String,
    pub operating_system_name: String,
    pub operating_system_version: String,
    pub scanning_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroup {
    /// `-1` means all ports (ICMP and all-protocol rules)
    pub from_port: i32,
    pub ip_protocol: String,
    pub ip_ranges: Vec<String>,
    pub to_port: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccessEndpointUrl {
    pub port: u16,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AmiDeliveryOptionDetails {
    pub ami_source: AmiSource,
    pub usage_instructions: String,
    pub recommended_instance_type: String,
    #[serde(default)]
    pub security_groups: Vec<SecurityGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_endpoint_url: Option<AccessEndpointUrl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeliveryOptionDetails {
    pub ami_delivery_option_details: AmiDeliveryOptionDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeliveryOption {
    /// Existing delivery option id, only sent when updating a version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub details: DeliveryOptionDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
}

/// New version with its delivery options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionMapping {
    pub version: Version,
    pub delivery_options: Vec<DeliveryOption>,
}

// ============================================================================
// DescribeEntity / ListEntities
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeEntityResponse {
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_identifier: Option<String>,
    #[serde(default)]
    pub entity_arn: Option<String>,
    #[serde(default)]
    pub last_modified_date: Option<String>,
    /// Entity details as a JSON encoded string
    #[serde(default)]
    pub details: Option<String>,
    /// Entity details as a JSON document
    #[serde(default)]
    pub details_document: Option<Value>,
}

impl DescribeEntityResponse {
    /// Decode the product details, if the entity carries any
    pub fn parsed_details(&self) -> Result<Option<ProductDetailResponse>> {
        if let Some(document) = self.details_document.as_ref().filter(|d| d.is_object()) {
            return Ok(Some(serde_json::from_value(document.clone())?));
        }
        match self.details.as_deref() {
            Some(details) if !details.trim().is_empty() => Ok(Some(serde_json::from_str(details)?)),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductDetailResponse {
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default)]
    pub versions: Vec<ProductVersionsResponse>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductDeliveryOption {
    pub id: String,
    #[serde(default, rename = "Type")]
    pub option_type: Option<String>,
    #[serde(default)]
    pub visibility: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceOperatingSystem {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub scanning_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AmiVirtualizationSource {
    pub id: String,
    pub image: String,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub virtualization_type: Option<String>,
    #[serde(default)]
    pub operating_system: Option<SourceOperatingSystem>,
    #[serde(default)]
    pub compatibility: Option<Value>,
}

/// Artifact backing a product version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum ProductVersionSource {
    AmazonMachineImage(AmiVirtualizationSource),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductVersionsResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub version_title: String,
    #[serde(default)]
    pub creation_date: String,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub delivery_options: Vec<ProductDeliveryOption>,
    #[serde(default)]
    pub sources: Vec<ProductVersionSource>,
}

impl ProductVersionsResponse {
    /// AMI ids of the version's machine image sources
    pub fn ami_ids(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter_map(|s| match s {
                ProductVersionSource::AmazonMachineImage(ami) => Some(ami.image.clone()),
                ProductVersionSource::Other => None,
            })
            .collect()
    }
}

/// A product version flattened for version restriction
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedVersions {
    pub title: String,
    pub delivery_options: Vec<ProductDeliveryOption>,
    pub created_date: String,
    pub ami_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntityFilter {
    pub name: String,
    pub value_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListEntitiesRequest {
    pub catalog: String,
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter_list: Vec<EntityFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntitySummary {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub entity_arn: Option<String>,
    #[serde(default)]
    pub last_modified_date: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListEntitiesResponse {
    #[serde(default)]
    pub entity_summary_list: Vec<EntitySummary>,
    #[serde(default)]
    pub next_token: Option<String>,
}

// ============================================================================
// Change sets
// ============================================================================

/// Whether a change set is applied or only validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeSetIntent {
    Apply,
    Validate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeEntity {
    #[serde(rename = "Type")]
    pub entity_type: String,
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Change {
    pub change_type: String,
    pub entity: ChangeEntity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_document: Option<Value>,
}

impl Change {
    /// Build a change for a versioned entity type, e.g. "AmiProduct@1.0"
    pub fn new(change_type: &str, entity_type: &str, identifier: &str, details: Value) -> Self {
        Self {
            change_type: change_type.to_string(),
            entity: ChangeEntity {
                entity_type: format!("{}@1.0", entity_type),
                identifier: identifier.to_string(),
            },
            details_document: Some(details),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeSetRequest {
    pub catalog: String,
    pub change_set: Vec<Change>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<ChangeSetIntent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeSetResponse {
    pub change_set_id: String,
    #[serde(default)]
    pub change_set_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorDetail {
    pub error_code: String,
    pub error_message: String,
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code, self.error_message)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeSummary {
    #[serde(default)]
    pub change_type: Option<String>,
    #[serde(default)]
    pub entity: Option<Value>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub error_detail_list: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeChangeSetResponse {
    pub change_set_id: String,
    #[serde(default)]
    pub change_set_arn: Option<String>,
    pub status: String,
    #[serde(default)]
    pub failure_code: Option<String>,
    #[serde(default)]
    pub failure_description: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub change_set: Vec<ChangeSummary>,
}

impl DescribeChangeSetResponse {
    /// Errors reported by the first change of the set
    pub fn error_details(&self) -> Vec<ErrorDetail> {
        self.change_set
            .first()
            .map(|c| c.error_detail_list.clone())
            .unwrap_or_default()
    }
}

/// Decode an error list published behind a URL.
pub fn parse_error_details(body: &str) -> Result<Vec<ErrorDetail>> {
    serde_json::from_str(body)
        .map_err(|e| CloudPubError::Decode(format!("Invalid error list: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn version_mapping_json() -> Value {
        json!({
            "Version": {"VersionTitle": "Test-Version-Title", "ReleaseNotes": "Test notes"},
            "DeliveryOptions": [{
                "Details": {
                    "AmiDeliveryOptionDetails": {
                        "AmiSource": {
                            "AmiId": "ami-0123456789",
                            "AccessRoleArn": "arn:aws:iam::000000000000:role/FakeScanning",
                            "UserName": "ec2-user",
                            "OperatingSystemName": "fake",
                            "OperatingSystemVersion": "Fake-9.0.3_HVM-x86_64-2",
                            "ScanningPort": 22
                        },
                        "UsageInstructions": "Test notes",
                        "RecommendedInstanceType": "x1.medium",
                        "SecurityGroups": [{
                            "FromPort": 22,
                            "IpProtocol": "tcp",
                            "IpRanges": ["22.22.22.22"],
                            "ToPort": 22
                        }],
                        "AccessEndpointUrl": {"Port": 22, "Protocol": "http"}
                    }
                },
                "Visibility": "Public"
            }]
        })
    }

    #[test]
    fn test_version_mapping_hides_unset_id() {
        let mapping: VersionMapping = serde_json::from_value(version_mapping_json()).unwrap();
        assert_eq!(mapping.version.version_title, "Test-Version-Title");
        assert_eq!(mapping.delivery_options[0].id, None);

        let encoded = serde_json::to_value(&mapping).unwrap();
        assert!(encoded["DeliveryOptions"][0].get("Id").is_none());
        assert_eq!(encoded, version_mapping_json());
    }

    #[test]
    fn test_security_group_all_ports() {
        let group: SecurityGroup = serde_json::from_value(json!({
            "FromPort": -1,
            "IpProtocol": "icmp",
            "IpRanges": ["0.0.0.0/0"],
            "ToPort": -1
        }))
        .unwrap();
        assert_eq!(group.from_port, -1);
        assert_eq!(group.to_port, -1);

        let encoded = serde_json::to_value(&group).unwrap();
        assert_eq!(encoded["FromPort"], json!(-1));
        assert_eq!(encoded["ToPort"], json!(-1));
    }

    #[test]
    fn test_describe_entity_details_string() {
        let response = DescribeEntityResponse {
            details: Some(
                json!({
                    "Versions": [{
                        "Id": "version-1",
                        "VersionTitle": "9.0 20220513",
                        "CreationDate": "2022-01-24T12:41:25.503Z",
                        "DeliveryOptions": [{"Id": "do-1", "Visibility": "Public", "Type": "AmazonMachineImage"}],
                        "Sources": [
                            {"Type": "AmazonMachineImage", "Id": "src-1", "Image": "ami-1"},
                            {"Type": "CloudFormationTemplate", "Id": "src-2"}
                        ]
                    }]
                })
                .to_string(),
            ),
            ..Default::default()
        };

        let details = response.parsed_details().unwrap().unwrap();
        assert_eq!(details.versions.len(), 1);
        assert_eq!(details.versions[0].ami_ids(), vec!["ami-1".to_string()]);
        assert_eq!(details.versions[0].delivery_options[0].option_type.as_deref(), Some("AmazonMachineImage"));
    }

    #[test]
    fn test_describe_entity_without_details() {
        let response = DescribeEntityResponse::default();
        assert!(response.parsed_details().unwrap().is_none());
    }

    #[test]
    fn test_change_entity_type_suffix() {
        let change = Change::new("RestrictDeliveryOptions", "AmiProduct", "prod-1", json!({}));
        let encoded = serde_json::to_value(&change).unwrap();
        assert_eq!(encoded["Entity"]["Type"], "AmiProduct@1.0");
        assert_eq!(encoded["ChangeType"], "RestrictDeliveryOptions");
        assert_eq!(
            serde_json::to_value(ChangeSetIntent::Validate).unwrap(),
            json!("VALIDATE")
        );
    }
}
