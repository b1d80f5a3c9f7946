// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the AWS product service.
//!
//! The Marketplace Catalog API is replaced by an in-memory catalog recording
//! the change sets it receives.

use async_trait::async_trait;
use cloudpub_core::application::AwsProductService;
use cloudpub_core::domain::aws::{
    ChangeSetIntent, ChangeSetRequest, ChangeSetResponse, ChangeSummary, DescribeChangeSetResponse,
    DescribeEntityResponse, EntitySummary, ErrorDetail, ListEntitiesRequest, ListEntitiesResponse,
    VersionMapping,
};
use cloudpub_core::domain::catalog::MarketplaceCatalog;
use cloudpub_core::domain::config::ChangeSetPollingConfig;
use cloudpub_core::{AwsVersionMetadata, CloudPubError, Publisher, PublishingMetadata, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[derive(Default)]
struct FakeCatalog {
    entity: Mutex<Option<DescribeEntityResponse>>,
    summaries: Mutex<Vec<EntitySummary>>,
    statuses: Mutex<VecDeque<String>>,
    failure: Mutex<Option<DescribeChangeSetResponse>>,
    change_sets: Mutex<Vec<ChangeSetRequest>>,
    described: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
}

impl FakeCatalog {
    fn with_details(details: Value) -> Self {
        let catalog = Self::default();
        *catalog.entity.lock() = Some(DescribeEntityResponse {
            details_document: Some(details),
            ..Default::default()
        });
        catalog
    }

    fn with_statuses(self, statuses: &[&str]) -> Self {
        *self.statuses.lock() = statuses.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[async_trait]
impl MarketplaceCatalog for FakeCatalog {
    async fn describe_entity(&self, _catalog: &str, entity_id: &str) -> Result<DescribeEntityResponse> {
        self.entity
            .lock()
            .clone()
            .ok_or_else(|| CloudPubError::NotFound(format!("unknown entity {}", entity_id)))
    }

    async fn list_entities(&self, _request: &ListEntitiesRequest) -> Result<ListEntitiesResponse> {
        Ok(ListEntitiesResponse {
            entity_summary_list: self.summaries.lock().clone(),
            next_token: None,
        })
    }

    async fn start_change_set(&self, request: &ChangeSetRequest) -> Result<ChangeSetResponse> {
        let mut change_sets = self.change_sets.lock();
        change_sets.push(request.clone());
        Ok(ChangeSetResponse {
            change_set_id: format!("cs-{}", change_sets.len()),
            change_set_arn: None,
        })
    }

    async fn describe_change_set(&self, _catalog: &str, change_set_id: &str) -> Result<DescribeChangeSetResponse> {
        self.described.lock().push(change_set_id.to_string());
        if let Some(failure) = self.failure.lock().clone() {
            return Ok(failure);
        }

        let mut statuses = self.statuses.lock();
        let status = match statuses.len() {
            0 => "SUCCEEDED".to_string(),
            1 => statuses[0].clone(),
            _ => statuses.pop_front().unwrap_or_default(),
        };
        Ok(DescribeChangeSetResponse {
            change_set_id: change_set_id.to_string(),
            status,
            ..Default::default()
        })
    }

    async fn cancel_change_set(&self, _catalog: &str, change_set_id: &str) -> Result<ChangeSetResponse> {
        self.cancelled.lock().push(change_set_id.to_string());
        Ok(ChangeSetResponse {
            change_set_id: change_set_id.to_string(),
            change_set_arn: None,
        })
    }
}

fn service(catalog: &Arc<FakeCatalog>) -> AwsProductService {
    let dyn_catalog: Arc<dyn MarketplaceCatalog> = catalog.clone();
    AwsProductService::new(
        dyn_catalog,
        &ChangeSetPollingConfig {
            attempts: 3,
            interval: Duration::ZERO,
        },
    )
}

fn version(title: &str, id: &str, visibility: &str, created: &str, ami: &str) -> Value {
    json!({
        "Id": format!("version-{}", id),
        "VersionTitle": title,
        "CreationDate": created,
        "ReleaseNotes": "Notes",
        "DeliveryOptions": [{
            "Id": id,
            "Type": "AmiDeliveryOption",
            "Visibility": visibility,
            "Title": title,
            "SourceId": format!("source-{}", id)
        }],
        "Sources": [
            {
                "Type": "AmazonMachineImage",
                "Id": format!("source-{}", id),
                "Image": ami,
                "Architecture": "x86_64",
                "VirtualizationType": "hvm",
                "OperatingSystem": {"Name": "RHEL", "Version": "9.0", "Username": "ec2-user", "ScanningPort": 22}
            },
            {"Type": "Container", "Id": "other-source"}
        ]
    })
}

fn details(versions: Vec<Value>) -> Value {
    json!({"Description": {"ProductTitle": "Fake product"}, "Versions": versions})
}

fn default_details() -> Value {
    details(vec![
        version("Test-Version-Title", "fake-id1", "Public", "2022-01-24T12:41:25.503Z", "ami-fake-1"),
        version("Other-Version-Title", "fake-id2", "Public", "2022-02-24T12:41:25.503Z", "ami-fake-2"),
    ])
}

fn version_mapping() -> VersionMapping {
    serde_json::from_value(json!({
        "Version": {"VersionTitle": "Test-Version-Title", "ReleaseNotes": "Test notes"},
        "DeliveryOptions": [{
            "Id": "stale-id",
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
                    "SecurityGroups": [{"FromPort": 22, "IpProtocol": "tcp", "IpRanges": ["22.22.22.22"], "ToPort": 22}]
                }
            }
        }]
    }))
    .unwrap()
}

fn metadata() -> AwsVersionMetadata {
    let base = PublishingMetadata::new("ami-0123456789", "x86_64", "fake-entity").unwrap();
    AwsVersionMetadata::new(base, version_mapping(), "AmiProduct").unwrap()
}

#[tokio::test]
async fn test_get_product_by_id() {
    let catalog = Arc::new(FakeCatalog::with_details(default_details()));
    let details = assert_ok!(service(&catalog).get_product_by_id("fake-entity").await);

    assert_eq!(details.versions.len(), 2);
    assert_eq!(details.versions[0].ami_ids(), vec!["ami-fake-1"]);
}

#[tokio::test]
async fn test_get_product_by_id_missing_details() {
    let catalog = Arc::new(FakeCatalog::default());
    *catalog.entity.lock() = Some(DescribeEntityResponse::default());

    let err = assert_err!(service(&catalog).get_product_by_id("fake-entity").await);
    assert_eq!(err.to_string(), "No such product with EntityId: \"fake-entity\"");
}

#[tokio::test]
async fn test_get_product_by_name() {
    let catalog = Arc::new(FakeCatalog::with_details(default_details()));
    let svc = service(&catalog);

    let err = assert_err!(svc.get_product_by_name("AmiProduct", "fake-product").await);
    assert_eq!(err.to_string(), "No such product with name \"fake-product\"");

    *catalog.summaries.lock() = vec![EntitySummary {
        name: Some("fake-product".to_string()),
        entity_id: Some("fake-entity".to_string()),
        ..Default::default()
    }];
    let details = assert_ok!(svc.get_product_by_name("AmiProduct", "fake-product").await);
    assert_eq!(details.versions.len(), 2);

    catalog.summaries.lock().push(EntitySummary::default());
    let err = assert_err!(svc.get_product_by_name("AmiProduct", "fake-product").await);
    assert!(matches!(err, CloudPubError::InvalidState(_)));
    assert!(err.to_string().contains("Multiple responses found for \"fake-product\""));
}

#[tokio::test]
async fn test_get_product_version_lookups() {
    let catalog = Arc::new(FakeCatalog::with_details(default_details()));
    let svc = service(&catalog);

    let version = assert_ok!(svc.get_product_version_details("fake-entity", "fake-id2").await);
    assert_eq!(version.version_title, "Other-Version-Title");

    let err = assert_err!(svc.get_product_version_details("fake-entity", "missing").await);
    assert_eq!(err.to_string(), "No such version with id \"missing\"");

    let option = assert_ok!(svc.get_product_version_by_name("fake-entity", "Test-Version-Title").await);
    assert_eq!(option.id, "fake-id1");

    let err = assert_err!(svc.get_product_version_by_name("fake-entity", "missing").await);
    assert_eq!(err.to_string(), "No such version with name \"missing\"");
}

#[tokio::test]
async fn test_product_without_versions() {
    let catalog = Arc::new(FakeCatalog::with_details(details(Vec::new())));

    let err = assert_err!(service(&catalog).get_product_versions("fake-entity").await);
    assert_eq!(err.to_string(), "This product has no versions");
}

#[tokio::test]
async fn test_get_product_versions() {
    let catalog = Arc::new(FakeCatalog::with_details(default_details()));
    let versions = assert_ok!(service(&catalog).get_product_versions("fake-entity").await);

    assert_eq!(versions.len(), 2);
    assert_eq!(versions[1].title, "Other-Version-Title");
    assert_eq!(versions[1].created_date, "2022-02-24T12:41:25.503Z");
    assert_eq!(versions[1].ami_ids, vec!["ami-fake-2"]);
    assert_eq!(versions[1].delivery_options[0].id, "fake-id2");
}

#[tokio::test]
async fn test_set_restrict_versions() {
    let catalog = Arc::new(FakeCatalog::default());
    let ids = vec!["1234-1234-1234-1234".to_string()];

    let change_set_id = assert_ok!(
        service(&catalog)
            .set_restrict_versions("fake-entity-id", "fake-product-type", &ids)
            .await
    );
    assert_eq!(change_set_id, "cs-1");

    let requests = catalog.change_sets.lock();
    let change = &requests[0].change_set[0];
    assert_eq!(requests[0].catalog, "AWSMarketplace");
    assert_eq!(change.change_type, "RestrictDeliveryOptions");
    assert_eq!(change.entity.entity_type, "fake-product-type@1.0");
    assert_eq!(change.entity.identifier, "fake-entity-id");
    assert_eq!(
        change.details_document,
        Some(json!({"DeliveryOptionIds": ["1234-1234-1234-1234"]}))
    );
}

#[tokio::test]
async fn test_cancel_change_set() {
    let catalog = Arc::new(FakeCatalog::default());
    let id = assert_ok!(service(&catalog).cancel_change_set("cs-42").await);

    assert_eq!(id, "cs-42");
    assert_eq!(*catalog.cancelled.lock(), vec!["cs-42".to_string()]);
}

#[tokio::test]
async fn test_check_publish_status_failed() {
    let catalog = Arc::new(FakeCatalog::default());
    *catalog.failure.lock() = Some(DescribeChangeSetResponse {
        change_set_id: "cs-1".to_string(),
        status: "FAILED".to_string(),
        failure_code: Some("CLIENT_ERROR".to_string()),
        change_set: vec![ChangeSummary {
            error_detail_list: vec![ErrorDetail {
                error_code: "INVALID_AMI".to_string(),
                error_message: "The AMI could not be scanned".to_string(),
            }],
            ..Default::default()
        }],
        ..Default::default()
    });

    let err = assert_err!(service(&catalog).check_publish_status("cs-1").await);
    match err {
        CloudPubError::ChangeSetFailed {
            change_set_id,
            failure_code,
            errors,
        } => {
            assert_eq!(change_set_id, "cs-1");
            assert_eq!(failure_code, "CLIENT_ERROR");
            assert_eq!(errors[0].error_code, "INVALID_AMI");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_check_publish_status_fetches_linked_errors() {
    let mut server = mockito::Server::new_async().await;
    let errors = server
        .mock("GET", "/errors.json")
        .with_status(200)
        .with_body(r#"[{"ErrorCode": "SCAN_FAILED", "ErrorMessage": "Port 22 is closed"}]"#)
        .create_async()
        .await;

    let catalog = Arc::new(FakeCatalog::default());
    *catalog.failure.lock() = Some(DescribeChangeSetResponse {
        change_set_id: "cs-1".to_string(),
        status: "Failed".to_string(),
        failure_code: Some("CLIENT_ERROR".to_string()),
        change_set: vec![ChangeSummary {
            error_detail_list: vec![ErrorDetail {
                error_code: "ERRORS_URL".to_string(),
                error_message: format!("{}/errors.json", server.url()),
            }],
            ..Default::default()
        }],
        ..Default::default()
    });

    let err = assert_err!(service(&catalog).check_publish_status("cs-1").await);
    match err {
        CloudPubError::ChangeSetFailed { errors, .. } => {
            assert_eq!(
                errors,
                vec![ErrorDetail {
                    error_code: "SCAN_FAILED".to_string(),
                    error_message: "Port 22 is closed".to_string(),
                }]
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    errors.assert_async().await;
}

#[tokio::test]
async fn test_wait_for_changeset() {
    let catalog = Arc::new(FakeCatalog::default().with_statuses(&["PREPARING", "APPLYING", "SUCCEEDED"]));

    assert_ok!(service(&catalog).wait_for_changeset("cs-1").await);
    assert_eq!(catalog.described.lock().len(), 3);
}

#[tokio::test]
async fn test_wait_for_changeset_timeout() {
    let catalog = Arc::new(FakeCatalog::default().with_statuses(&["APPLYING"]));

    let err = assert_err!(service(&catalog).wait_for_changeset("cs-1").await);
    assert!(matches!(err, CloudPubError::Timeout(_)));
    assert_eq!(err.to_string(), "Timed out waiting for cs-1 to finish");
    assert_eq!(catalog.described.lock().len(), 3);
}

#[tokio::test]
async fn test_publish() {
    let catalog = Arc::new(FakeCatalog::default());
    assert_ok!(service(&catalog).publish(&metadata()).await);

    let requests = catalog.change_sets.lock();
    let change = &requests[0].change_set[0];
    assert_eq!(requests[0].intent, Some(ChangeSetIntent::Apply));
    assert_eq!(change.change_type, "AddDeliveryOptions");
    assert_eq!(change.entity.entity_type, "AmiProduct@1.0");
    assert_eq!(change.entity.identifier, "fake-entity");

    let details = change.details_document.clone().unwrap();
    assert_eq!(details["Version"]["VersionTitle"], "Test-Version-Title");
    assert!(details["DeliveryOptions"][0].get("Id").is_none());
    assert_eq!(*catalog.described.lock(), vec!["cs-1".to_string()]);
}

#[tokio::test]
async fn test_publish_overwrite() {
    let catalog = Arc::new(FakeCatalog::with_details(default_details()));
    let mut metadata = metadata();
    metadata.base.overwrite = true;

    assert_ok!(service(&catalog).publish(&metadata).await);

    let requests = catalog.change_sets.lock();
    let change = &requests[0].change_set[0];
    assert_eq!(change.change_type, "UpdateDeliveryOptions");
    let details = change.details_document.clone().unwrap();
    assert_eq!(details["DeliveryOptions"][0]["Id"], "fake-id1");
}

#[tokio::test]
async fn test_publish_keepdraft_skips_catalog() {
    // No entity is known: any lookup would fail
    let catalog = Arc::new(FakeCatalog::default());
    let mut metadata = metadata();
    metadata.base.keepdraft = true;
    metadata.base.overwrite = true;
    assert_ok!(service(&catalog).publish(&metadata).await);

    let preview = self::metadata().with_preview_only(true);
    assert_ok!(service(&catalog).publish(&preview).await);

    assert!(catalog.change_sets.lock().is_empty());
    assert!(catalog.described.lock().is_empty());
}

#[tokio::test]
async fn test_publish_failed_changeset() {
    let catalog = Arc::new(FakeCatalog::default());
    *catalog.failure.lock() = Some(DescribeChangeSetResponse {
        change_set_id: "cs-1".to_string(),
        status: "FAILED".to_string(),
        failure_code: Some("CLIENT_ERROR".to_string()),
        ..Default::default()
    });

    let err = assert_err!(service(&catalog).publish(&metadata()).await);
    assert!(matches!(err, CloudPubError::ChangeSetFailed { .. }));
    // A failed change set is not polled again
    assert_eq!(catalog.described.lock().len(), 1);
}

fn minor_versions_details() -> Value {
    details(vec![
        version("9.0 20220513-0", "fake-id1", "Restricted", "2022-01-24T12:41:25.503Z", "ami-fake-id-1"),
        version("9.0 20220613", "fake-id2", "Public", "2022-02-24T12:41:25.503Z", "ami-fake-id-2"),
        version("9.0 20220713", "fake-id3", "Limited", "2022-03-24T12:41:25.503Z", "ami-fake-id-3"),
        version("9.0 20220813", "fake-id4", "Restricted", "2022-04-24T12:41:25.503Z", "ami-fake-id-4"),
        version("9.0 20220913", "fake-id5", "Public", "2022-05-24T12:41:25.503Z", "ami-fake-id-5"),
        version(
            "OpenShift Container Platform 9.0",
            "fake-id6",
            "Public",
            "2022-01-24T12:41:25.503Z",
            "ami-fake-id-6",
        ),
        version("9.1 20220913", "fake-id1-2", "Public", "2022-03-24T12:41:25.503Z", "ami-fake-id-7"),
        version("9.1 20220513", "fake-id1-3", "Public", "2022-03-24T12:41:25.503Z", "ami-fake-id-8"),
        version("BadVersion", "fake-id1-6", "Public", "2022-01-24T12:41:25.503Z", "ami-fake-id-9"),
    ])
}

#[tokio::test]
async fn test_restrict_minor_versions() {
    let catalog = Arc::new(FakeCatalog::with_details(minor_versions_details()));

    let amis = assert_ok!(
        service(&catalog)
            .restrict_minor_versions("fake-entity", "fake-entity-type", "9.0")
            .await
    );
    assert_eq!(amis, vec!["ami-fake-id-2", "ami-fake-id-6"]);

    let requests = catalog.change_sets.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].change_set[0].details_document,
        Some(json!({"DeliveryOptionIds": ["fake-id2", "fake-id6"]}))
    );
    assert_eq!(*catalog.described.lock(), vec!["cs-1".to_string()]);
}

#[tokio::test]
async fn test_restrict_minor_versions_no_match() {
    let catalog = Arc::new(FakeCatalog::with_details(details(vec![version(
        "BadVersion",
        "fake-id1-6",
        "Public",
        "2022-01-24T12:41:25.503Z",
        "ami-fake-id-9",
    )])));

    let amis = assert_ok!(
        service(&catalog)
            .restrict_minor_versions("fake-entity", "fake-entity-type", "9.0")
            .await
    );
    assert!(amis.is_empty());
    assert!(catalog.change_sets.lock().is_empty());
}

#[tokio::test]
async fn test_restrict_versions_by_release() {
    let catalog = Arc::new(FakeCatalog::with_details(details(vec![
        version("8.6 20220101", "id-8-6", "Public", "2022-01-01T00:00:00.000Z", "ami-8-6"),
        version("9.0 20220513", "id-9-0-a", "Public", "2022-05-13T00:00:00.000Z", "ami-9-0-a"),
        version("9.1 20220613", "id-9-1-a", "Public", "2022-06-13T00:00:00.000Z", "ami-9-1-a"),
        version("9.1 20220713", "id-9-1-b", "Public", "2022-07-13T00:00:00.000Z", "ami-9-1-b"),
    ])));

    let amis = assert_ok!(
        service(&catalog)
            .restrict_versions("fake-entity", "AmiProduct", Some(1), Some(1))
            .await
    );
    assert_eq!(amis, vec!["ami-8-6", "ami-9-0-a", "ami-9-1-a"]);

    let requests = catalog.change_sets.lock();
    assert_eq!(
        requests[0].change_set[0].details_document,
        Some(json!({"DeliveryOptionIds": ["id-8-6", "id-9-0-a", "id-9-1-a"]}))
    );
}

#[tokio::test]
async fn test_image_scan_is_unsupported() {
    let catalog = Arc::new(FakeCatalog::default());
    let svc = service(&catalog);

    assert!(matches!(
        svc.start_image_scan("ami-1").await,
        Err(CloudPubError::Unsupported(_))
    ));
    assert!(matches!(
        svc.check_image_scan("ami-1").await,
        Err(CloudPubError::Unsupported(_))
    ));
}
