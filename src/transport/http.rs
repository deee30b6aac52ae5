//! HTTP transport for oracle nodes

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Client,
};
use tracing::debug;

use super::{PriceRequest, PriceTransport, RawPayload};
use crate::error::{NetworkError, OracleError, Result};

const PRICES_PATH: &str = "/prices";

/// REST client for one oracle node
pub struct HttpTransport {
    client: Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn network_error(&self, err: reqwest::Error) -> OracleError {
        if err.is_timeout() {
            NetworkError::Timeout {
                after_ms: self.timeout_ms,
            }
            .into()
        } else {
            NetworkError::Cause(err.to_string()).into()
        }
    }
}

#[async_trait]
impl PriceTransport for HttpTransport {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn fetch(&self, request: &PriceRequest) -> Result<RawPayload> {
        let url = format!("{}{}", self.base_url, PRICES_PATH);
        let params = request.query_params();
        debug!(url = %url, params = ?params, "Fetching prices");

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Cause(format!("{} returned {}: {}", url, status, body)).into());
        }

        let body = response.text().await.map_err(|e| self.network_error(e))?;
        serde_json::from_str(&body)
            .map_err(|e| OracleError::MalformedResponse(format!("{} from {}", e, url)))
    }
}
