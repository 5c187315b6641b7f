//! Outbound HTTP for webhook deliveries.

use crate::error::{EngineError, EngineResult};
use crate::store::HttpMethod;
use async_trait::async_trait;
use std::time::Duration;

/// A fully rendered delivery request.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Sends one delivery attempt.
///
/// Returns the response status for any HTTP response. Transport failures,
/// timeouts included, are `TransientIo`.
#[async_trait]
pub trait WebhookClient: Send + Sync {
    async fn send(&self, request: &WebhookRequest) -> EngineResult<u16>;
}

/// HTTP client for webhook endpoints.
pub struct ReqwestWebhookClient {
    client: reqwest::Client,
}

impl ReqwestWebhookClient {
    /// # Arguments
    /// * `timeout` - Per-request timeout
    pub fn new(timeout: Duration) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::TransientIo(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookClient for ReqwestWebhookClient {
    async fn send(&self, request: &WebhookRequest) -> EngineResult<u16> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            EngineError::TransientIo(format!("Request to {} failed: {}", request.url, e))
        })?;
        Ok(response.status().as_u16())
    }
}
