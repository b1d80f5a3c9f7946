// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Azure Product Ingestion API Infrastructure

pub mod session;

pub use session::{AccessToken, PartnerPortalSession};
