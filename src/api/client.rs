use crate::config::ApiConfig;
use crate::error::{AnimaError, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client for the backend, shared by the classifier and history components
#[derive(Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

/// Error payload returned by the backend on non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl BackendClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AnimaError::system(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling)
    pub fn with_client(client: reqwest::Client, config: &ApiConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .timeout(self.timeout)
    }

    pub(crate) fn post(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .timeout(self.timeout)
    }

    /// Map a transport failure, attributing timeouts to the configured bound
    pub(crate) fn transport_error(&self, err: reqwest::Error, operation: &str) -> AnimaError {
        if err.is_timeout() {
            AnimaError::timeout(operation, self.timeout)
        } else {
            AnimaError::from(err)
        }
    }

    /// Extract the server-provided message from an error response, if any
    pub(crate) async fn error_message(response: reqwest::Response) -> Option<String> {
        let text = response.text().await.ok()?;
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => body.message.or(body.error),
            Err(_) => None,
        }
    }

    /// Invalidate the session server-side; failures are only logged
    pub async fn logout(&self, token: &str) {
        let response = self.post("/auth/logout", token).send().await;
        match response {
            Ok(response) if response.status().is_success() => {
                debug!("Backend session closed");
            }
            Ok(response) => {
                warn!("Logout returned status {}", response.status());
            }
            Err(e) => {
                warn!("Logout request failed: {}", e);
            }
        }
    }
}
