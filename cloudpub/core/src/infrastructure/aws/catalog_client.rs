// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Catalog HTTP Client
//!
//! AWS Marketplace Catalog API adapter. Implements the `MarketplaceCatalog`
//! trait as an Anti-Corruption Layer over the REST-JSON endpoints.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements catalog_client
//!
//! # API Endpoints
//!
//! - `GET /DescribeEntity?catalog=..&entityId=..`
//! - `POST /ListEntities`
//! - `POST /StartChangeSet`
//! - `GET /DescribeChangeSet?catalog=..&changeSetId=..`
//! - `PATCH /CancelChangeSet?catalog=..&changeSetId=..`

use crate::domain::aws::{
    ChangeSetRequest, ChangeSetResponse, DescribeChangeSetResponse, DescribeEntityResponse,
    ListEntitiesRequest, ListEntitiesResponse,
};
use crate::domain::catalog::MarketplaceCatalog;
use crate::domain::config::{AwsConfig, RetryConfig};
use crate::domain::error::{CloudPubError, Result};
use crate::infrastructure::aws::sigv4::SigV4Signer;
use crate::infrastructure::http::{raise_for_status, send_with_retry};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

const SERVICE: &str = "aws-marketplace";

pub struct CatalogHttpClient {
    client: Client,
    endpoint: Url,
    signer: SigV4Signer,
    retry: RetryConfig,
}

impl CatalogHttpClient {
    pub fn new(endpoint: &str, signer: SigV4Signer, retry: RetryConfig) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| CloudPubError::InvalidInput(format!("Invalid catalog endpoint \"{}\": {}", endpoint, e)))?;
        Ok(Self {
            client: Client::new(),
            endpoint,
            signer,
            retry,
        })
    }

    pub fn from_config(config: &AwsConfig) -> Result<Self> {
        let credentials = config.credentials.resolved()?;
        let signer = SigV4Signer::new(&credentials, config.region.clone(), SERVICE);
        Self::new(&config.catalog_endpoint(), signer, config.retry.clone())
    }

    fn url(&self, operation: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .endpoint
            .join(operation)
            .map_err(|e| CloudPubError::InvalidInput(format!("Invalid operation \"{}\": {}", operation, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        operation: &str,
        query: &[(&str, &str)],
        body: Option<Vec<u8>>,
    ) -> Result<T> {
        let url = self.url(operation, query)?;
        let payload = body.unwrap_or_default();
        info!("Calling AWS Marketplace Catalog {}", operation);

        let response = send_with_retry(&self.retry, operation, || {
            let content_type = [("content-type", "application/json")];
            // Every attempt is signed with its own timestamp
            let signed = self.signer.sign(
                method.as_str(),
                &url,
                &content_type,
                &payload,
                chrono::Utc::now(),
            )?;
            let mut builder = self
                .client
                .request(method.clone(), url.clone())
                .header("content-type", "application/json")
                .body(payload.clone());
            for (name, value) in signed {
                builder = builder.header(name, value);
            }
            Ok(builder)
        })
        .await?;

        let response = raise_for_status(response).await?;
        let text = response
            .text()
            .await
            .map_err(|e| CloudPubError::Network(e.to_string()))?;
        debug!("{} response: {}", operation, text);
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl MarketplaceCatalog for CatalogHttpClient {
    async fn describe_entity(&self, catalog: &str, entity_id: &str) -> Result<DescribeEntityResponse> {
        self.call(
            Method::GET,
            "DescribeEntity",
            &[("catalog", catalog), ("entityId", entity_id)],
            None,
        )
        .await
    }

    async fn list_entities(&self, request: &ListEntitiesRequest) -> Result<ListEntitiesResponse> {
        let body = serde_json::to_vec(request)?;
        self.call(Method::POST, "ListEntities", &[], Some(body)).await
    }

    async fn start_change_set(&self, request: &ChangeSetRequest) -> Result<ChangeSetResponse> {
        let body = serde_json::to_vec(request)?;
        self.call(Method::POST, "StartChangeSet", &[], Some(body)).await
    }

    async fn describe_change_set(
        &self,
        catalog: &str,
        change_set_id: &str,
    ) -> Result<DescribeChangeSetResponse> {
        self.call(
            Method::GET,
            "DescribeChangeSet",
            &[("catalog", catalog), ("changeSetId", change_set_id)],
            None,
        )
        .await
    }

    async fn cancel_change_set(&self, catalog: &str, change_set_id: &str) -> Result<ChangeSetResponse> {
        self.call(
            Method::PATCH,
            "CancelChangeSet",
            &[("catalog", catalog), ("changeSetId", change_set_id)],
            None,
        )
        .await
    }
}
