// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Catalog
//!
//! AWS Marketplace Catalog API interface (Anti-Corruption Layer).
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements catalog

// Implementations live in infrastructure/aws/. The product service only
// depends on this trait so it can be driven by an in-memory catalog.

use crate::domain::aws::{
    ChangeSetRequest, ChangeSetResponse, DescribeChangeSetResponse, DescribeEntityResponse,
    ListEntitiesRequest, ListEntitiesResponse,
};
use crate::domain::error::Result;
use async_trait::async_trait;

/// Catalog name used for every AWS Marketplace request
pub const AWS_MARKETPLACE_CATALOG: &str = "AWSMarketplace";

#[async_trait]
pub trait MarketplaceCatalog: Send + Sync {
    async fn describe_entity(&self, catalog: &str, entity_id: &str) -> Result<DescribeEntityResponse>;

    async fn list_entities(&self, request: &ListEntitiesRequest) -> Result<ListEntitiesResponse>;

    async fn start_change_set(&self, request: &ChangeSetRequest) -> Result<ChangeSetResponse>;

    async fn describe_change_set(
        &self,
        catalog: &str,
        change_set_id: &str,
    ) -> Result<DescribeChangeSetResponse>;

    async fn cancel_change_set(&self, catalog: &str, change_set_id: &str) -> Result<ChangeSetResponse>;
}
