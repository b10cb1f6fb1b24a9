use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::protocol::API_PREFIX;
use crate::config::{AuthScheme, RancherConfig};
use crate::error::DiscoveryError;
use super::api::ApiResponse;

/// Authenticated access to the Rancher API. Holds nothing but connection
/// parameters.
#[derive(Clone)]
pub struct RancherClient {
    client: Client,
    base_url: String,
}

impl RancherClient {
    pub fn new(config: &RancherConfig) -> Result<Self> {
        let credential = match config.auth_scheme {
            AuthScheme::Basic => format!("Basic {}", STANDARD.encode(&config.token)),
            AuthScheme::Bearer => format!("Bearer {}", config.token),
        };
        let mut authorization = HeaderValue::from_str(&credential)
            .context("Rancher token is not a valid header value")?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);

        if config.accept_invalid_certs {
            tracing::warn!("Certificate verification disabled for {}", config.url);
        }

        // Certificate relaxation applies to this client only, never to probes
        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(config.request_timeout())
            .build()
            .context("Failed to build Rancher HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL of an API path such as `/projects`
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    /// GETs `url` and decodes the body, translating error envelopes into
    /// `DiscoveryError::Remote` regardless of the HTTP status.
    pub async fn get_json<T>(&self, url: &str, query: &[(&str, &str)]) -> Result<T, DiscoveryError>
    where
        T: DeserializeOwned + ApiResponse,
    {
        let transport = |source: reqwest::Error| DiscoveryError::Transport {
            url: url.to_string(),
            source,
        };

        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        let parsed: T = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(DiscoveryError::UnexpectedStatus {
                    url: url.to_string(),
                    status,
                });
            }
            Err(source) => {
                return Err(DiscoveryError::Decode {
                    url: url.to_string(),
                    source,
                });
            }
        };

        if let Some(message) = parsed.error_message() {
            return Err(DiscoveryError::Remote(message));
        }
        if !status.is_success() {
            return Err(DiscoveryError::UnexpectedStatus {
                url: url.to_string(),
                status,
            });
        }

        Ok(parsed)
    }
}
