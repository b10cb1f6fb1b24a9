use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use shared::types::host_port;
use crate::config::DiscoveryConfig;
use crate::error::ProbeError;

/// Liveness check for scrape endpoints. Uses its own client: no Rancher
/// credentials and full certificate verification.
#[derive(Clone)]
pub struct Prober {
    client: Client,
    scheme: String,
}

impl Prober {
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.probe_timeout())
            .build()
            .context("Failed to build probe HTTP client")?;

        Ok(Self {
            client,
            scheme: config.probe_scheme.clone(),
        })
    }

    pub fn scrape_url(&self, ip: &str, port: u16, path: &str) -> String {
        let separator = if path.starts_with('/') { "" } else { "/" };
        format!("{}://{}{}{}", self.scheme, host_port(ip, port), separator, path)
    }

    /// Succeeds only on HTTP 200
    pub async fn probe(&self, url: &str) -> Result<(), ProbeError> {
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(ProbeError::Status(status)),
        }
    }
}
