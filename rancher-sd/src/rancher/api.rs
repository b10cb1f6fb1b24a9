//! Response bodies of the Rancher `v2-beta` API, reduced to the fields
//! discovery needs.

use std::collections::HashMap;
use serde::Deserialize;
use shared::protocol::ERROR_ENVELOPE_TYPE;

/// Implemented by every response body so the client can surface error
/// envelopes uniformly, whatever the HTTP status.
pub trait ApiResponse {
    fn error_message(&self) -> Option<String>;
}

fn envelope_error(kind: Option<&str>, message: Option<&str>, code: Option<&str>) -> Option<String> {
    if kind != Some(ERROR_ENVELOPE_TYPE) {
        return None;
    }
    let message = message
        .filter(|m| !m.is_empty())
        .or(code)
        .unwrap_or("unknown error");
    Some(message.to_string())
}

/// `{type, message, data: [...]}`
#[derive(Debug, Deserialize)]
pub struct Collection<T> {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> ApiResponse for Collection<T> {
    fn error_message(&self) -> Option<String> {
        envelope_error(
            self.kind.as_deref(),
            self.message.as_deref(),
            self.code.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub links: ServiceLinks,
    #[serde(default)]
    pub launch_config: Option<LaunchConfig>,
    #[serde(default)]
    pub public_endpoints: Option<Vec<PublicEndpoint>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceLinks {
    #[serde(default)]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaunchConfig {
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicEndpoint {
    pub ip_address: String,
    pub port: u16,
    pub host_id: String,
}

impl Service {
    pub fn labels(&self) -> Option<&HashMap<String, String>> {
        self.launch_config.as_ref()?.labels.as_ref()
    }

    pub fn public_endpoints(&self) -> &[PublicEndpoint] {
        self.public_endpoints.as_deref().unwrap_or_default()
    }
}

/// Resource behind a service's `links.stack`
#[derive(Debug, Deserialize)]
pub struct Stack {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ApiResponse for Stack {
    fn error_message(&self) -> Option<String> {
        envelope_error(
            self.kind.as_deref(),
            self.message.as_deref(),
            self.code.as_deref(),
        )
    }
}
