// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP Helpers
//!
//! Shared plumbing of the marketplace HTTP adapters: retry of transient
//! failures, status mapping and URL manipulation.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements http

use crate::domain::config::RetryConfig;
use crate::domain::error::{CloudPubError, Result};
use reqwest::{RequestBuilder, Response};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, error, warn};
use url::Url;

/// Server errors worth retrying
pub const RETRY_STATUS_CODES: std::ops::RangeInclusive<u16> = 500..=511;

/// Send a request, retrying server errors and transport failures.
///
/// `make_request` is called once per attempt so that every attempt can carry
/// fresh headers (e.g. a new signature).
pub async fn send_with_retry<F>(retry: &RetryConfig, what: &str, mut make_request: F) -> Result<Response>
where
    F: FnMut() -> Result<RequestBuilder>,
{
    let mut attempt = 0;
    loop {
        let request = make_request()?;
        let remaining = attempt < retry.total_retries;

        match request.send().await {
            Ok(response) if RETRY_STATUS_CODES.contains(&response.status().as_u16()) && remaining => {
                warn!(
                    "{} returned HTTP {} (attempt {}/{}), retrying",
                    what,
                    response.status().as_u16(),
                    attempt + 1,
                    retry.total_retries + 1
                );
            }
            Ok(response) => return Ok(response),
            Err(e) if remaining => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    what,
                    attempt + 1,
                    retry.total_retries + 1,
                    e
                );
            }
            Err(e) => {
                error!("{} failed: {}", what, e);
                return Err(CloudPubError::Network(e.to_string()));
            }
        }

        tokio::time::sleep(retry.backoff(attempt)).await;
        attempt += 1;
    }
}

/// Map non-success responses to errors
pub async fn raise_for_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    error!("Request to {} failed with HTTP {}: {}", url, status.as_u16(), body);

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(CloudPubError::NotFound("Resource not found.".to_string()));
    }
    Err(CloudPubError::Http {
        status: status.as_u16(),
        body,
    })
}

/// Read a JSON body, treating an empty body as `null`
pub async fn read_json(response: Response) -> Result<Value> {
    let body = response
        .text()
        .await
        .map_err(|e| CloudPubError::Network(e.to_string()))?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    debug!("Received response body of {} bytes", body.len());
    Ok(serde_json::from_str(&body)?)
}

/// Ensure a JSON value is an object
pub fn assert_dict(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => {
            let kind = match other {
                Value::Null => "null",
                Value::Bool(_) => "bool",
                Value::Number(_) => "number",
                Value::String(_) => "string",
                Value::Array(_) => "list",
                Value::Object(_) => "dict",
            };
            error!("Expected response type \"dict\", got \"{}\"", kind);
            Err(CloudPubError::UnexpectedType(format!(
                "Expected response type \"dict\", got \"{}\"",
                kind
            )))
        }
    }
}

/// Query parameters of a URL, left percent-encoded as they appear
pub fn get_url_params(url: &str) -> Result<BTreeMap<String, String>> {
    let parsed = Url::parse(url).map_err(|e| CloudPubError::InvalidInput(format!("Invalid URL \"{}\": {}", url, e)))?;
    let params = parsed
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect();
    Ok(params)
}

/// Decoded query parameters of a pagination link, which may be relative to `base`
pub fn get_link_params(base: &str, link: &str) -> Result<Vec<(String, String)>> {
    let parsed = Url::parse(base)
        .and_then(|base| base.join(link))
        .map_err(|e| CloudPubError::InvalidInput(format!("Invalid link \"{}\": {}", link, e)))?;
    Ok(parsed.query_pairs().into_owned().collect())
}

/// Request parameters followed by the mandatory ones, which replace any parameter of the same name
pub fn merge_params(params: &[(String, String)], mandatory: &[(String, String)]) -> Vec<(String, String)> {
    params
        .iter()
        .filter(|(key, _)| !mandatory.iter().any(|(name, _)| name == key))
        .chain(mandatory)
        .cloned()
        .collect()
}

/// Join URL segments with a single slash between them
pub fn join_url(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Scheme and authority of a URL (e.g. "https://graph.microsoft.com")
pub fn base_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| CloudPubError::InvalidInput(format!("Invalid URL \"{}\": {}", url, e)))?;
    Ok(parsed.origin().ascii_serialization())
}

/// URL without its query string and fragment
pub fn strip_query(url: &str) -> Result<String> {
    let mut parsed =
        Url::parse(url).map_err(|e| CloudPubError::InvalidInput(format!("Invalid URL \"{}\": {}", url, e)))?;
    parsed.set_query(None);
    parsed.set_fragment(None);
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_url_helpers() {
        let params = get_url_params("https://foo.blob.core.windows.net/a.vhd?sv=2020&sig=ab%2Bc&sp=r").unwrap();
        assert_eq!(params.get("sig").map(String::as_str), Some("ab%2Bc"));
        assert_eq!(params.len(), 3);

        assert_eq!(
            join_url(&["https://graph.microsoft.com/rp/product-ingestion/", "/configure"]),
            "https://graph.microsoft.com/rp/product-ingestion/configure"
        );
        assert_eq!(
            base_url("https://graph.microsoft.com/rp/product-ingestion").unwrap(),
            "https://graph.microsoft.com"
        );
        assert_eq!(
            strip_query("https://foo.blob.core.windows.net/a.vhd?sv=1").unwrap(),
            "https://foo.blob.core.windows.net/a.vhd"
        );
    }

    #[test]
    fn test_link_params_accept_relative_links() {
        let base = "https://graph.microsoft.com/rp/product-ingestion";
        let params = get_link_params(base, "product?$skipToken=a%2Bb&$version=2022-03-01").unwrap();
        assert_eq!(
            params,
            vec![
                ("$skipToken".to_string(), "a+b".to_string()),
                ("$version".to_string(), "2022-03-01".to_string()),
            ]
        );

        let absolute = get_link_params(base, "https://graph.microsoft.com/rp/product-ingestion/product?$skipToken=x")
            .unwrap();
        assert_eq!(absolute, vec![("$skipToken".to_string(), "x".to_string())]);
        assert!(get_link_params(base, "product").unwrap().is_empty());
        assert!(get_link_params("not a url", "product?a=1").is_err());
    }

    #[test]
    fn test_merge_params_keeps_single_mandatory_value() {
        let params = vec![
            ("$skipToken".to_string(), "page2".to_string()),
            ("$version".to_string(), "2022-03-01".to_string()),
        ];
        let mandatory = vec![("$version".to_string(), "2022-07-01".to_string())];

        assert_eq!(
            merge_params(&params, &mandatory),
            vec![
                ("$skipToken".to_string(), "page2".to_string()),
                ("$version".to_string(), "2022-07-01".to_string()),
            ]
        );
        assert_eq!(merge_params(&[], &mandatory), mandatory);
    }

    #[test]
    fn test_assert_dict() {
        assert!(assert_dict(json!({"a": 1})).is_ok());
        let err = assert_dict(json!([1, 2])).unwrap_err();
        assert!(matches!(err, CloudPubError::UnexpectedType(_)));
    }

    #[tokio::test]
    async fn test_send_with_retry_recovers_from_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/flaky", server.url());
        let retry = RetryConfig {
            total_retries: 1,
            backoff_factor: Duration::ZERO,
        };

        let response = send_with_retry(&retry, "flaky", || Ok(client.get(&url))).await.unwrap();
        assert_eq!(response.status().as_u16(), 503);
        failing.assert_async().await;

        let err = raise_for_status(response).await.unwrap_err();
        assert!(matches!(err, CloudPubError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_raise_for_status_not_found() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/missing").with_status(404).create_async().await;

        let response = reqwest::get(format!("{}/missing", server.url())).await.unwrap();
        let err = raise_for_status(response).await.unwrap_err();
        assert_eq!(err.to_string(), "Resource not found.");
    }
}
