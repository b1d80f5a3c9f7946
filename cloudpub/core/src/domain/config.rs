// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Publisher Configuration Types
//
// Defines the configuration schema for the marketplace publishers, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Azure Partner Center credentials and API endpoints
// - AWS Marketplace credentials and region
// - Retry and polling policies for long running vendor jobs

use crate::domain::error::{CloudPubError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_API_VERSION: &str = "cloudpub/v1";
pub const CONFIG_KIND: &str = "PublisherConfig";

/// Top-level Kubernetes-style publisher configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudPubConfigManifest {
    /// API version (must be "cloudpub/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "PublisherConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: CloudPubConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Marketplaces to configure; absent sections are not usable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudPubConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsConfig>,
}

// ============================================================================
// Shared policies
// ============================================================================

/// HTTP retry policy for transient server errors (500-511) and transport failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_total_retries")]
    pub total_retries: u32,

    /// Base delay, doubled after every failed attempt
    #[serde(default = "default_backoff_factor", with = "humantime_serde")]
    pub backoff_factor: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            total_retries: default_total_retries(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn disabled() -> Self {
        Self {
            total_retries: 0,
            backoff_factor: Duration::ZERO,
        }
    }

    /// Delay before the given retry (0-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_factor.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Waits between status queries; the last wait repeats until the deadline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    pub waits: Vec<humantime_serde::Serde<Duration>>,

    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl PollingConfig {
    pub fn new(waits: Vec<Duration>, deadline: Option<Duration>, max_attempts: Option<u32>) -> Self {
        Self {
            waits: waits.into_iter().map(Into::into).collect(),
            deadline,
            max_attempts,
        }
    }

    /// Poll without waiting, bounded by attempts only
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(Vec::new(), None, Some(max_attempts))
    }

    pub fn wait_durations(&self) -> Vec<Duration> {
        self.waits.iter().map(|w| **w).collect()
    }

    /// Azure `configure` job schedule: 1m, 30m, 1h then every 12h for 7 days
    pub fn azure_jobs() -> Self {
        Self::new(
            vec![
                Duration::from_secs(60),
                Duration::from_secs(30 * 60),
                Duration::from_secs(60 * 60),
                Duration::from_secs(12 * 60 * 60),
            ],
            Some(Duration::from_secs(7 * 24 * 60 * 60)),
            None,
        )
    }

    /// Wait for running submissions every 5m for 7 days
    pub fn azure_publish_lock() -> Self {
        Self::new(
            vec![Duration::from_secs(5 * 60)],
            Some(Duration::from_secs(7 * 24 * 60 * 60)),
            None,
        )
    }
}

/// Bounded retry of a whole operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptConfig {
    pub attempts: u32,

    #[serde(with = "humantime_serde")]
    pub wait: Duration,
}

impl AttemptConfig {
    pub fn new(attempts: u32, wait: Duration) -> Self {
        Self { attempts, wait }
    }
}

// ============================================================================
// Azure
// ============================================================================

/// Partner Center service principal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AzureCredentials {
    /// Publisher (seller) name; supports "env:VAR_NAME"
    pub publisher_name: String,
    /// Client id; supports "env:VAR_NAME"
    pub client_id: String,
    /// Tenant id; supports "env:VAR_NAME"
    pub tenant_id: String,
    /// Client secret; supports "env:VAR_NAME"
    pub api_secret: String,
}

impl AzureCredentials {
    pub const AUTH_KEYS: [&'static str; 4] = [
        "AZURE_PUBLISHER_NAME",
        "AZURE_CLIENT_ID",
        "AZURE_TENANT_ID",
        "AZURE_API_SECRET",
    ];

    /// Build credentials from the `AZURE_*` key/value pairs
    pub fn from_auth_keys(keys: &HashMap<String, String>) -> Result<Self> {
        let mut values = Vec::with_capacity(Self::AUTH_KEYS.len());
        for key in Self::AUTH_KEYS {
            match keys.get(key).filter(|v| !v.is_empty()) {
                Some(value) => values.push(value.clone()),
                None => {
                    return Err(CloudPubError::InvalidAuthData(format!(
                        "The key/value for \"{}\" must be set.",
                        key
                    )))
                }
            }
        }
        let mut values = values.into_iter();
        Ok(Self {
            publisher_name: values.next().unwrap_or_default(),
            client_id: values.next().unwrap_or_default(),
            tenant_id: values.next().unwrap_or_default(),
            api_secret: values.next().unwrap_or_default(),
        })
    }

    /// Resolve "env:VAR_NAME" values and ensure every field is set
    pub fn resolved(&self) -> Result<Self> {
        let resolved = Self {
            publisher_name: resolve_secret(&self.publisher_name)?,
            client_id: resolve_secret(&self.client_id)?,
            tenant_id: resolve_secret(&self.tenant_id)?,
            api_secret: resolve_secret(&self.api_secret)?,
        };
        resolved.validate()?;
        Ok(resolved)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            (Self::AUTH_KEYS[0], &self.publisher_name),
            (Self::AUTH_KEYS[1], &self.client_id),
            (Self::AUTH_KEYS[2], &self.tenant_id),
            (Self::AUTH_KEYS[3], &self.api_secret),
        ];
        for (key, value) in fields {
            if value.is_empty() {
                return Err(CloudPubError::InvalidAuthData(format!(
                    "The key/value for \"{}\" must be set.",
                    key
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    pub credentials: AzureCredentials,

    /// Product Ingestion API version sent as `$version`
    #[serde(default = "default_azure_api_version")]
    pub api_version: String,

    /// Version of the resource schemas
    #[serde(default = "default_azure_api_version")]
    pub schema_version: String,

    /// Token endpoint; `{tenant_id}` is replaced by the tenant
    #[serde(default = "default_azure_login_url")]
    pub login_url: String,

    #[serde(default = "default_azure_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "PollingConfig::azure_jobs")]
    pub job_polling: PollingConfig,

    #[serde(default = "PollingConfig::azure_publish_lock")]
    pub publish_lock_polling: PollingConfig,

    /// Retries of a preview/live submission
    #[serde(default = "default_publish_retry")]
    pub publish_retry: AttemptConfig,
}

impl AzureConfig {
    pub fn new(credentials: AzureCredentials) -> Self {
        Self {
            credentials,
            api_version: default_azure_api_version(),
            schema_version: default_azure_api_version(),
            login_url: default_azure_login_url(),
            api_url: default_azure_api_url(),
            retry: RetryConfig::default(),
            job_polling: PollingConfig::azure_jobs(),
            publish_lock_polling: PollingConfig::azure_publish_lock(),
            publish_retry: default_publish_retry(),
        }
    }

    /// Token endpoint for the given tenant
    pub fn login_url_for(&self, tenant_id: &str) -> String {
        self.login_url.replace("{tenant_id}", tenant_id)
    }
}

// ============================================================================
// AWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsCredentials {
    /// Supports "env:VAR_NAME"
    pub access_key_id: String,
    /// Supports "env:VAR_NAME"
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn resolved(&self) -> Result<Self> {
        let resolved = Self {
            access_key_id: resolve_secret(&self.access_key_id)?,
            secret_access_key: resolve_secret(&self.secret_access_key)?,
            session_token: self.session_token.as_deref().map(resolve_secret).transpose()?,
        };
        if resolved.access_key_id.is_empty() || resolved.secret_access_key.is_empty() {
            return Err(CloudPubError::InvalidAuthData(
                "The AWS access key id and secret access key must be set.".to_string(),
            ));
        }
        Ok(resolved)
    }
}

/// Fixed-interval polling of AWS change sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSetPollingConfig {
    #[serde(default = "default_changeset_attempts")]
    pub attempts: u32,

    #[serde(default = "default_changeset_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for ChangeSetPollingConfig {
    fn default() -> Self {
        Self {
            attempts: default_changeset_attempts(),
            interval: default_changeset_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub credentials: AwsCredentials,

    #[serde(default = "default_aws_region")]
    pub region: String,

    /// Overrides `https://catalog.marketplace.{region}.amazonaws.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub changeset_polling: ChangeSetPollingConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl AwsConfig {
    pub fn new(credentials: AwsCredentials) -> Self {
        Self {
            credentials,
            region: default_aws_region(),
            endpoint: None,
            changeset_polling: ChangeSetPollingConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn catalog_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://catalog.marketplace.{}.amazonaws.com", self.region))
    }
}

/// Resolve a value that may reference an environment variable ("env:VAR_NAME")
pub fn resolve_secret(value: &str) -> Result<String> {
    match value.strip_prefix("env:") {
        Some(var_name) => std::env::var(var_name).map_err(|_| {
            CloudPubError::InvalidAuthData(format!("Environment variable not set: {}", var_name))
        }),
        None => Ok(value.to_string()),
    }
}

fn default_total_retries() -> u32 {
    5
}

fn default_backoff_factor() -> Duration {
    Duration::from_secs(1)
}

fn default_azure_api_version() -> String {
    "2022-07-01".to_string()
}

fn default_azure_login_url() -> String {
    "https://login.microsoftonline.com/{tenant_id}/oauth2/token".to_string()
}

fn default_azure_api_url() -> String {
    "https://graph.microsoft.com/rp/product-ingestion".to_string()
}

fn default_publish_retry() -> AttemptConfig {
    AttemptConfig::new(3, Duration::from_secs(60))
}

fn default_changeset_attempts() -> u32 {
    288
}

fn default_changeset_interval() -> Duration {
    Duration::from_secs(600)
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}

impl Default for CloudPubConfigManifest {
    fn default() -> Self {
        Self {
            api_version: CONFIG_API_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            metadata: ManifestMetadata {
                name: "cloudpub".to_string(),
                version: None,
                labels: None,
            },
            spec: CloudPubConfigSpec::default(),
        }
    }
}

impl CloudPubConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. CLOUDPUB_CONFIG_PATH environment variable
    /// 2. ./cloudpub-config.yaml (working directory)
    /// 3. ~/.cloudpub/config.yaml (user home)
    /// 4. /etc/cloudpub/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CLOUDPUB_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./cloudpub-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".cloudpub").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/cloudpub/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = explicit_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using empty defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        let Some(azure) = self.spec.azure.as_mut() else {
            return;
        };

        if let Ok(val) = std::env::var("AZURE_API_VERSION") {
            if !val.is_empty() {
                tracing::info!("Environment override: AZURE_API_VERSION={}", val);
                azure.api_version = val;
            }
        }

        if let Ok(val) = std::env::var("AZURE_SCHEMA_VERSION") {
            if !val.is_empty() {
                tracing::info!("Environment override: AZURE_SCHEMA_VERSION={}", val);
                azure.schema_version = val;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != CONFIG_API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                CONFIG_API_VERSION
            );
        }

        if self.kind != CONFIG_KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, CONFIG_KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if let Some(azure) = &self.spec.azure {
            azure.credentials.validate()?;
            if azure.api_version.is_empty() || azure.schema_version.is_empty() {
                anyhow::bail!("spec.azure.api_version and spec.azure.schema_version cannot be empty");
            }
            if !azure.api_url.starts_with("http") {
                anyhow::bail!("spec.azure.api_url must be an http(s) URL: {}", azure.api_url);
            }
            if azure.publish_retry.attempts == 0 {
                anyhow::bail!("spec.azure.publish_retry.attempts must be at least 1");
            }
            for (name, polling) in [
                ("job_polling", &azure.job_polling),
                ("publish_lock_polling", &azure.publish_lock_polling),
            ] {
                if polling.deadline.is_none() && polling.max_attempts.is_none() {
                    anyhow::bail!("spec.azure.{} must set a deadline or max_attempts", name);
                }
            }
        }

        if let Some(aws) = &self.spec.aws {
            if aws.credentials.access_key_id.is_empty() || aws.credentials.secret_access_key.is_empty() {
                anyhow::bail!("spec.aws.credentials must set access_key_id and secret_access_key");
            }
            if aws.region.is_empty() {
                anyhow::bail!("spec.aws.region cannot be empty");
            }
            if aws.changeset_polling.attempts == 0 {
                anyhow::bail!("spec.aws.changeset_polling.attempts must be at least 1");
            }
        }

        Ok(())
    }
}
