// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Marketplace models, publishing metadata and the seams to vendor APIs.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements mod

pub mod error;
pub mod metadata;
pub mod publisher;
pub mod catalog;
pub mod config;
pub mod aws;
pub mod azure;

pub use error::{CloudPubError, Result};
pub use metadata::{AwsVersionMetadata, AzurePublishingMetadata, Generation, PublishingMetadata};
pub use publisher::Publisher;
