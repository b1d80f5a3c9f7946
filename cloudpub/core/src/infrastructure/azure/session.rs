// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Partner Portal Session
//!
//! Authenticated HTTP session for the Azure Product Ingestion API.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements session
//!
//! # Authentication
//!
//! A client-credentials bearer token is requested from the Microsoft login
//! endpoint with `resource` set to the base URL of the API prefix. The token
//! is cached until its `expires_on` and renewed on the next request.

use crate::domain::config::{AzureConfig, AzureCredentials, RetryConfig};
use crate::domain::error::{CloudPubError, Result};
use crate::infrastructure::http::{base_url, join_url, merge_params, send_with_retry};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

/// Microsoft API bearer token
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_on
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
    expires_on: Value,
}

impl TryFrom<LoginResponse> for AccessToken {
    type Error = CloudPubError;

    fn try_from(value: LoginResponse) -> Result<Self> {
        // Microsoft returns the epoch either as a number or as a string
        let epoch = match &value.expires_on {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            CloudPubError::LoginFailed(format!("Invalid token expiration: {}", value.expires_on))
        })?;

        let expires_on = Utc
            .timestamp_opt(epoch, 0)
            .single()
            .ok_or_else(|| CloudPubError::LoginFailed(format!("Invalid token expiration: {}", epoch)))?;

        debug!("Obtained token with expiration date on {}", expires_on);
        Ok(Self {
            access_token: value.access_token,
            expires_on,
        })
    }
}

pub struct PartnerPortalSession {
    client: Client,
    credentials: AzureCredentials,
    login_url: String,
    prefix_url: String,
    resource: String,
    mandatory_params: Vec<(String, String)>,
    retry: RetryConfig,
    token: Mutex<Option<AccessToken>>,
}

impl PartnerPortalSession {
    pub fn new(
        credentials: AzureCredentials,
        login_url: impl Into<String>,
        prefix_url: impl Into<String>,
        mandatory_params: Vec<(String, String)>,
        retry: RetryConfig,
    ) -> Result<Self> {
        credentials.validate().inspect_err(|e| error!("{}", e))?;
        let prefix_url = prefix_url.into();
        let resource = base_url(&prefix_url)?;

        Ok(Self {
            client: Client::new(),
            credentials,
            login_url: login_url.into(),
            prefix_url,
            resource,
            mandatory_params,
            retry,
            token: Mutex::new(None),
        })
    }

    /// Session for the Product Ingestion API, sending `$version` on every request
    pub fn from_config(config: &AzureConfig) -> Result<Self> {
        debug!("Creating a session with Azure Product Ingestion API");
        let credentials = config.credentials.resolved()?;
        let login_url = config.login_url_for(&credentials.tenant_id);
        Self::new(
            credentials,
            login_url,
            config.api_url.clone(),
            vec![("$version".to_string(), config.schema_version.clone())],
            config.retry.clone(),
        )
    }

    pub fn publisher(&self) -> &str {
        &self.credentials.publisher_name
    }

    pub fn prefix_url(&self) -> &str {
        &self.prefix_url
    }

    /// Audience of the bearer token
    pub fn resource(&self) -> &str {
        &self.resource
    }

    async fn login(&self) -> Result<AccessToken> {
        info!("Retrieving the bearer token from Microsoft");
        let form = [
            ("resource", self.resource.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.api_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let response = send_with_retry(&self.retry, "Login", || {
            Ok(self
                .client
                .post(&self.login_url)
                .header("Accept", "application/json")
                .form(&form))
        })
        .await
        .map_err(|e| CloudPubError::LoginFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!("Login failed with HTTP {}: {}", status, body);
            return Err(CloudPubError::LoginFailed(format!("HTTP {}: {}", status, body)));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| CloudPubError::LoginFailed(format!("Failed to parse login response: {}", e)))?;
        AccessToken::try_from(login)
    }

    async fn get_token(&self) -> Result<String> {
        let cached = self.token.lock().clone();
        if let Some(token) = cached.filter(|t| !t.is_expired()) {
            debug!("Serving the bearer token");
            return Ok(token.access_token);
        }

        let token = self.login().await?;
        let access_token = token.access_token.clone();
        *self.token.lock() = Some(token);
        Ok(access_token)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        json: Option<&Value>,
    ) -> Result<Response> {
        let token = self.get_token().await?;
        let url = join_url(&[&self.prefix_url, path]);
        info!("Sending a {} request to {}", method, path);

        let query = merge_params(params, &self.mandatory_params);

        send_with_retry(&self.retry, &format!("{} {}", method, path), || {
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .header("Accept", "application/json")
                .bearer_auth(&token)
                .query(&query);
            if let Some(body) = json {
                builder = builder.json(body);
            }
            Ok(builder)
        })
        .await
    }

    pub async fn get(&self, path: &str, params: &[(String, String)]) -> Result<Response> {
        self.request(Method::GET, path, params, None).await
    }

    pub async fn post(&self, path: &str, json: &Value) -> Result<Response> {
        self.request(Method::POST, path, &[], Some(json)).await
    }

    pub async fn put(&self, path: &str, json: &Value) -> Result<Response> {
        self.request(Method::PUT, path, &[], Some(json)).await
    }
}
