use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::protocol::{LABEL_HOSTNAME, LABEL_SERVICE, LABEL_STACK};

/// A validated scrape target discovered in a Rancher project.
/// Only built once its endpoint has answered a liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTarget {
    /// Display name of the owning stack
    pub stack: String,

    /// Name of the owning service
    pub service: String,

    /// Scrape address, `host:port`
    pub address: String,

    /// Rancher host serving the endpoint
    pub host_id: String,

    /// Propagated labels with the namespace prefix stripped
    pub labels: BTreeMap<String, String>,
}

/// Targets produced by one discovery cycle, in discovery order.
pub type DiscoverySnapshot = Vec<DiscoveredTarget>;

/// One entry of a Prometheus `file_sd_configs` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedTarget {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl From<&DiscoveredTarget> for PublishedTarget {
    fn from(target: &DiscoveredTarget) -> Self {
        let mut labels = target.labels.clone();
        // Reserved keys win over user labels of the same name
        labels.insert(LABEL_HOSTNAME.to_string(), target.host_id.clone());
        labels.insert(LABEL_STACK.to_string(), target.stack.clone());
        labels.insert(LABEL_SERVICE.to_string(), target.service.clone());

        Self {
            targets: vec![target.address.clone()],
            labels,
        }
    }
}

/// Converts a snapshot into its wire shape, preserving order
pub fn to_published(snapshot: &[DiscoveredTarget]) -> Vec<PublishedTarget> {
    snapshot.iter().map(PublishedTarget::from).collect()
}

/// Keeps the labels under `prefix`, stripping it. A key equal to the bare
/// prefix is dropped.
pub fn filter_labels<'a, I>(labels: I, prefix: &str) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    labels
        .into_iter()
        .filter_map(|(key, value)| {
            let stripped = key.strip_prefix(prefix)?;
            if stripped.is_empty() {
                return None;
            }
            Some((stripped.to_string(), value.clone()))
        })
        .collect()
}

/// Formats `host:port`, bracketing IPv6 literals
pub fn host_port(ip: &str, port: u16) -> String {
    if ip.contains(':') && !ip.starts_with('[') {
        format!("[{}]:{}", ip, port)
    } else {
        format!("{}:{}", ip, port)
    }
}
