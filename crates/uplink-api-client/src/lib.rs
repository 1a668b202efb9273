//! HTTP client for the retail data collection API.
//!
//! Exactly two calls per run: a form-encoded token grant, then a JSON
//! batch upload with the bearer token. The token lives in the client
//! instance and is never persisted; one client per run keeps runs
//! independently testable. Certificate validation is disabled by
//! configuration default — the platform's trust model is network-level
//! controls, and quietly re-enabling strict validation would break
//! deployed operators.

pub mod protocol;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use uplink_core::{ApiConfig, RetailRecord, Service, UplinkError};

pub use protocol::{RecordOutcome, UploadReceipt};

/// Seam the orchestrator drives; mocked in pipeline tests.
#[async_trait]
pub trait ReportApi: Send {
    /// Authenticate and retain the bearer token for this instance.
    async fn login(&mut self, username: &str, password: &str) -> Result<(), UplinkError>;

    /// Submit the full batch. Requires a prior successful [`login`].
    ///
    /// [`login`]: ReportApi::login
    async fn upload(&mut self, records: &[RetailRecord]) -> Result<UploadReceipt, UplinkError>;
}

pub struct ReportClient {
    client: reqwest::Client,
    base_url: String,
    host: String,
    port: u16,
    token: Option<String>,
}

impl ReportClient {
    pub fn new(config: &ApiConfig) -> Result<Self, UplinkError> {
        let url = reqwest::Url::parse(config.base_url()).map_err(|e| {
            UplinkError::Configuration(format!("invalid api.base_url '{}': {}", config.base_url, e))
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| {
                UplinkError::Configuration(format!(
                    "api.base_url '{}' has no host",
                    config.base_url
                ))
            })?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(443);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .no_proxy()
            .build()
            .map_err(|e| UplinkError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            host,
            port,
            token: None,
        })
    }

    fn transport_error(&self, error: reqwest::Error) -> UplinkError {
        UplinkError::Connection {
            service: Service::Api,
            host: self.host.clone(),
            port: self.port,
            detail: error.to_string(),
            timed_out: error.is_timeout(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ReportApi for ReportClient {
    async fn login(&mut self, username: &str, password: &str) -> Result<(), UplinkError> {
        let url = format!("{}{}", self.base_url, protocol::TOKEN_PATH);
        debug!(%url, username, "requesting token grant");

        let response = self
            .client
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        let token = protocol::interpret_login(status, &body)?;
        self.token = Some(token);
        Ok(())
    }

    async fn upload(&mut self, records: &[RetailRecord]) -> Result<UploadReceipt, UplinkError> {
        let token = self.token.as_deref().ok_or_else(|| {
            UplinkError::Configuration("upload attempted before login".to_string())
        })?;

        let url = format!("{}{}", self.base_url, protocol::UPLOAD_PATH);
        debug!(%url, count = records.len(), "uploading record batch");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(records)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        let receipt = protocol::interpret_upload(status, &body, records.len())?;
        if receipt.arity_mismatch() {
            // Correlation with itemId is positional and best-effort; a
            // count mismatch is worth the operator's attention.
            warn!(
                submitted = receipt.submitted,
                returned = receipt.outcomes.len(),
                "server returned a different number of outcomes than records submitted"
            );
        }
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_config(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: base_url.to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            timeout_secs: 30,
            accept_invalid_certs: true,
        }
    }

    #[test]
    fn test_client_derives_host_and_port() {
        let client = ReportClient::new(&api_config("https://collect.example.gov:8443/")).unwrap();
        assert_eq!(client.host, "collect.example.gov");
        assert_eq!(client.port, 8443);
        assert_eq!(client.base_url(), "https://collect.example.gov:8443");
    }

    #[test]
    fn test_default_https_port() {
        let client = ReportClient::new(&api_config("https://collect.example.gov")).unwrap();
        assert_eq!(client.port, 443);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            ReportClient::new(&api_config("not a url")),
            Err(UplinkError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_before_login_is_rejected() {
        let mut client = ReportClient::new(&api_config("https://collect.example.gov")).unwrap();
        let err = client.upload(&[]).await.unwrap_err();
        assert!(matches!(err, UplinkError::Configuration(_)));
    }
}
