// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Error
//!
//! Errors raised while talking to marketplace APIs.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements error

use crate::domain::aws::ErrorDetail;

pub type Result<T> = std::result::Result<T, CloudPubError>;

/// Errors that can occur during marketplace operations
#[derive(Debug, thiserror::Error)]
pub enum CloudPubError {
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{0}")]
    Timeout(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Invalid authentication data: {0}")]
    InvalidAuthData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unexpected response type: {0}")]
    UnexpectedType(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Job {job_id} failed with result \"{result}\": {}", errors.join("; "))]
    JobFailed {
        job_id: String,
        result: String,
        errors: Vec<String>,
    },

    #[error("Changeset {change_set_id} failed with code {failure_code}: {}", format_error_details(errors))]
    ChangeSetFailed {
        change_set_id: String,
        failure_code: String,
        errors: Vec<ErrorDetail>,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl CloudPubError {
    /// Fatal errors are surfaced immediately and never retried.
    pub fn is_fatal(&self) -> bool {
        match self {
            CloudPubError::NotFound(_)
            | CloudPubError::Timeout(_)
            | CloudPubError::LoginFailed(_)
            | CloudPubError::InvalidAuthData(_)
            | CloudPubError::InvalidInput(_)
            | CloudPubError::UnexpectedType(_)
            | CloudPubError::Decode(_)
            | CloudPubError::ChangeSetFailed { .. }
            | CloudPubError::Unsupported(_) => true,
            CloudPubError::Http { status, .. } => (400..500).contains(status),
            CloudPubError::InvalidState(_)
            | CloudPubError::Network(_)
            | CloudPubError::JobFailed { .. } => false,
        }
    }
}

impl From<serde_json::Error> for CloudPubError {
    fn from(e: serde_json::Error) -> Self {
        CloudPubError::Decode(e.to_string())
    }
}

fn format_error_details(errors: &[ErrorDetail]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
