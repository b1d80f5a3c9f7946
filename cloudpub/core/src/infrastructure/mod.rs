// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Marketplace Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates between the domain models and a vendor HTTP API.

pub mod http;
pub mod azure;
pub mod aws;

pub use aws::CatalogHttpClient;
pub use azure::PartnerPortalSession;
