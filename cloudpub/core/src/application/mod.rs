// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Application Services - Marketplace publishing use cases

pub mod polling;
pub mod offer_diff;
pub mod azure_reconcile;
pub mod azure_service;
pub mod aws_versions;
pub mod aws_service;

pub use aws_service::AwsProductService;
pub use azure_service::AzureService;
