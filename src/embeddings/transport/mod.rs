#[cfg(test)]
mod tests;

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

use crate::{MemoryError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Raw HTTP response handed back to the embedding client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal transport the embedding client depends on.
///
/// Implementations return `Ok` for every response the server sent, whatever
/// its status; only transport-level failures map to [`MemoryError::Network`].
#[async_trait]
pub trait HttpTransport: Debug + Send + Sync {
    async fn post_json(&self, url: &str, bearer_token: &str, body: String)
    -> Result<HttpResponse>;
}

/// Blocking `ureq` agent driven from the tokio blocking pool
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    #[inline]
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
    }
}

impl UreqTransport {
    #[inline]
    pub fn with_timeout(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self { agent }
    }
}

#[async_trait]
impl HttpTransport for UreqTransport {
    async fn post_json(
        &self,
        url: &str,
        bearer_token: &str,
        body: String,
    ) -> Result<HttpResponse> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let authorization = format!("Bearer {}", bearer_token);

        debug!("POST {} ({} bytes)", url, body.len());

        tokio::task::spawn_blocking(move || {
            let mut response = agent
                .post(url.as_str())
                .header("Authorization", authorization.as_str())
                .header("Content-Type", "application/json")
                .send(body.as_str())
                .map_err(|e| MemoryError::Network(format!("Request to {} failed: {}", url, e)))?;

            let status = response.status().as_u16();
            let body = response
                .body_mut()
                .read_to_string()
                .map_err(|e| MemoryError::Network(format!("Failed to read response: {}", e)))?;

            Ok(HttpResponse { status, body })
        })
        .await
        .map_err(|e| MemoryError::Network(format!("HTTP worker task failed: {}", e)))?
    }
}
