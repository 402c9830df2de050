use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::ExtractError;

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Fetches a URL and hands back its body as text.
///
/// Implementations report every failure, including non-success statuses, as
/// [`ExtractError::Transport`]. Nothing above this layer retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, ExtractError>;
}

/// Default transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractError::transport("<client>", e))?;
        Ok(Self::with_client(client))
    }

    /// Wraps a preconfigured client (proxies, custom TLS, ...).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, ExtractError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ExtractError::transport(url, e))?;

        if !resp.status().is_success() {
            return Err(ExtractError::transport(url, format!("HTTP {}", resp.status())));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ExtractError::transport(url, e))?;
        debug!("Fetched {} ({} bytes)", url, body.len());
        Ok(body)
    }
}
