// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// AWS Marketplace Catalog API Infrastructure

pub mod sigv4;
pub mod catalog_client;

pub use catalog_client::CatalogHttpClient;
pub use sigv4::SigV4Signer;
