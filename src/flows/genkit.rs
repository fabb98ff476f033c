//! HTTP client for a remote Genkit-style flow service.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::{FlowError, FlowId, FlowRunner};

pub struct GenkitClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GenkitClient {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build flow service HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            client,
        })
    }

    /// One-time reachability check, run during backend initialization.
    /// The daemon refuses to come up against an unreachable flow service.
    pub async fn handshake(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        self.client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("flow service unreachable at {url}"))?
            .error_for_status()
            .context("flow service health check failed")?;
        info!(base_url = %self.base_url, "flow service handshake ok");
        Ok(())
    }
}

#[async_trait]
impl FlowRunner for GenkitClient {
    async fn run(&self, flow: FlowId, input: Value) -> Result<Value, FlowError> {
        let url = format!("{}/flows/{}", self.base_url, flow);
        debug!(flow = %flow, url = %url, "invoking flow");

        let mut request = self.client.post(&url).json(&input);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let output = response.json::<Value>().await?;
        debug!(flow = %flow, "flow returned");
        Ok(output)
    }
}
