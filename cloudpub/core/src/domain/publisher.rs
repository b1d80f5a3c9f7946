// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Publisher
//!
//! Common interface of the marketplace services.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements publisher

use crate::domain::error::Result;
use async_trait::async_trait;

/// A marketplace able to associate an image with a listing and publish it
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Marketplace specific publishing request
    type Metadata: Send + Sync;

    /// Associate the image with its destination and publish it when requested
    async fn publish(&self, metadata: &Self::Metadata) -> Result<()>;
}
