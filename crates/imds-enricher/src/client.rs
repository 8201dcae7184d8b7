// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client for the EC2 instance metadata service.
//!
//! The processor only ever needs the instance identity document, so the client surface is a
//! single call. [`HttpImdsClient`] speaks IMDSv2 (session token) and falls back to IMDSv1 when
//! the token endpoint is not available.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::constants::{
    DEFAULT_IMDS_ENDPOINT, IMDS_IDENTITY_DOCUMENT_PATH, IMDS_TOKEN_HEADER, IMDS_TOKEN_PATH,
    IMDS_TOKEN_TTL_HEADER, IMDS_TOKEN_TTL_SECONDS,
};
use crate::errors::ImdsError;
use crate::identity::InstanceIdentityDocument;

#[async_trait]
pub trait ImdsClient: Send + Sync {
    async fn get_instance_identity_document(&self) -> Result<InstanceIdentityDocument, ImdsError>;
}

/// Where and whether to reach the metadata service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImdsClientConfig {
    /// Base URL of the metadata service (e.g., "http://169.254.169.254")
    pub endpoint: String,
    /// Set when `AWS_EC2_METADATA_DISABLED` is true, every call fails fast
    pub disabled: bool,
}

impl Default for ImdsClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_IMDS_ENDPOINT.to_string(),
            disabled: false,
        }
    }
}

impl ImdsClientConfig {
    /// Resolves the client configuration the same way the AWS SDKs do
    pub fn from_env() -> Self {
        Self::from_values(
            env::var("AWS_EC2_METADATA_SERVICE_ENDPOINT").ok().as_deref(),
            env::var("AWS_EC2_METADATA_DISABLED").ok().as_deref(),
        )
    }

    fn from_values(endpoint: Option<&str>, disabled: Option<&str>) -> Self {
        let endpoint = endpoint
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_IMDS_ENDPOINT.to_string());
        let disabled = disabled
            .map(|val| val.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self { endpoint, disabled }
    }
}

#[derive(Debug, Clone)]
pub struct HttpImdsClient {
    client: reqwest::Client,
    config: ImdsClientConfig,
}

impl HttpImdsClient {
    pub fn new(config: ImdsClientConfig, timeout: Duration) -> Result<Self, ImdsError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            // IMDS is link-local, never route it through a proxy
            .no_proxy()
            .build()
            .map_err(|e| ImdsError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint, path)
    }

    /// Requests an IMDSv2 session token. `None` means the endpoint only speaks IMDSv1.
    async fn get_token(&self) -> Result<Option<String>, ImdsError> {
        let response = self
            .client
            .put(self.url(IMDS_TOKEN_PATH))
            .header(IMDS_TOKEN_TTL_HEADER, IMDS_TOKEN_TTL_SECONDS.to_string())
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.text().await?)),
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => {
                debug!(
                    "IMDSv2 token endpoint returned {}, falling back to IMDSv1",
                    response.status()
                );
                Ok(None)
            }
            status => Err(ImdsError::Status {
                status: status.as_u16(),
                path: IMDS_TOKEN_PATH,
            }),
        }
    }
}

#[async_trait]
impl ImdsClient for HttpImdsClient {
    async fn get_instance_identity_document(&self) -> Result<InstanceIdentityDocument, ImdsError> {
        if self.config.disabled {
            return Err(ImdsError::Disabled);
        }

        let mut request = self.client.get(self.url(IMDS_IDENTITY_DOCUMENT_PATH));
        if let Some(token) = self.get_token().await? {
            request = request.header(IMDS_TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImdsError::Status {
                status: status.as_u16(),
                path: IMDS_IDENTITY_DOCUMENT_PATH,
            });
        }

        let body = response.bytes().await?;
        Ok(InstanceIdentityDocument::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::DOCUMENT;
    use mockito::{Matcher, Server, ServerGuard};
    use serial_test::serial;

    fn client_for(server: &ServerGuard) -> HttpImdsClient {
        HttpImdsClient::new(
            ImdsClientConfig {
                endpoint: server.url(),
                disabled: false,
            },
            Duration::from_secs(5),
        )
        .expect("failed to build client")
    }

    #[test]
    fn test_config_from_values() {
        assert_eq!(ImdsClientConfig::from_values(None, None), ImdsClientConfig::default());

        let config = ImdsClientConfig::from_values(Some(" http://[fd00:ec2::254]/ "), Some("TRUE"));
        assert_eq!(config.endpoint, "http://[fd00:ec2::254]");
        assert!(config.disabled);

        let config = ImdsClientConfig::from_values(Some(""), Some("no"));
        assert_eq!(config.endpoint, DEFAULT_IMDS_ENDPOINT);
        assert!(!config.disabled);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        env::set_var("AWS_EC2_METADATA_SERVICE_ENDPOINT", "http://127.0.0.1:1338/");
        env::set_var("AWS_EC2_METADATA_DISABLED", "true");
        let config = ImdsClientConfig::from_env();
        env::remove_var("AWS_EC2_METADATA_SERVICE_ENDPOINT");
        env::remove_var("AWS_EC2_METADATA_DISABLED");

        assert_eq!(config.endpoint, "http://127.0.0.1:1338");
        assert!(config.disabled);
        assert_eq!(ImdsClientConfig::from_env(), ImdsClientConfig::default());
    }

    #[tokio::test]
    async fn test_fetch_with_session_token() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("PUT", IMDS_TOKEN_PATH)
            .match_header(IMDS_TOKEN_TTL_HEADER, "21600")
            .with_status(200)
            .with_body("session-token")
            .create_async()
            .await;
        let document = server
            .mock("GET", IMDS_IDENTITY_DOCUMENT_PATH)
            .match_header(IMDS_TOKEN_HEADER, "session-token")
            .with_status(200)
            .with_body(DOCUMENT)
            .create_async()
            .await;

        let doc = client_for(&server)
            .get_instance_identity_document()
            .await
            .expect("fetch failed");

        assert_eq!(doc.region, "us-east-1");
        token.assert_async().await;
        document.assert_async().await;
    }

    #[tokio::test]
    async fn test_fallback_to_imdsv1() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("PUT", IMDS_TOKEN_PATH)
            .with_status(403)
            .create_async()
            .await;
        let document = server
            .mock("GET", IMDS_IDENTITY_DOCUMENT_PATH)
            .match_header(IMDS_TOKEN_HEADER, Matcher::Missing)
            .with_status(200)
            .with_body(DOCUMENT)
            .create_async()
            .await;

        let doc = client_for(&server)
            .get_instance_identity_document()
            .await
            .expect("fetch failed");

        assert_eq!(doc.instance_id, "i-1234567890abcdef0");
        document.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("PUT", IMDS_TOKEN_PATH)
            .with_status(200)
            .with_body("session-token")
            .create_async()
            .await;
        let _document = server
            .mock("GET", IMDS_IDENTITY_DOCUMENT_PATH)
            .with_status(429)
            .create_async()
            .await;

        let err = client_for(&server)
            .get_instance_identity_document()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ImdsError::Status {
                status: 429,
                path: IMDS_IDENTITY_DOCUMENT_PATH
            }
        ));
    }

    #[tokio::test]
    async fn test_disabled_client_fails_fast() {
        let client = HttpImdsClient::new(
            ImdsClientConfig {
                endpoint: "http://127.0.0.1:1".to_string(),
                disabled: true,
            },
            Duration::from_secs(1),
        )
        .expect("failed to build client");

        assert!(matches!(
            client.get_instance_identity_document().await,
            Err(ImdsError::Disabled)
        ));
    }
}
