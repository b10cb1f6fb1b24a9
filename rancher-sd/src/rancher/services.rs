use std::collections::BTreeMap;
use shared::types::filter_labels;
use crate::error::DiscoveryError;
use super::api::{Collection, PublicEndpoint, Service};
use super::client::RancherClient;

/// A service opted into discovery through its endpoint label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub stack_link: Option<String>,
    /// Path to scrape, value of the endpoint label
    pub endpoint_path: String,
    /// Propagated labels, prefix already stripped
    pub labels: BTreeMap<String, String>,
    pub endpoints: Vec<PublicEndpoint>,
}

impl RancherClient {
    /// List every service of a project. Any failure fails the whole listing.
    pub async fn services(&self, project_id: &str) -> Result<Vec<Service>, DiscoveryError> {
        let url = self.api_url(&format!("/projects/{}/services", project_id));
        let services: Collection<Service> = self.get_json(&url, &[]).await?;
        Ok(services.data)
    }
}

/// Keep the services carrying `endpoint_label`, in listing order
pub fn candidates(services: Vec<Service>, endpoint_label: &str, labels_prefix: &str) -> Vec<Candidate> {
    services
        .into_iter()
        .filter_map(|service| {
            let labels = service.labels()?;
            let endpoint_path = labels.get(endpoint_label)?.clone();
            let labels = filter_labels(labels, labels_prefix);
            let endpoints = service.public_endpoints().to_vec();

            Some(Candidate {
                name: service.name,
                stack_link: service.links.stack,
                endpoint_path,
                labels,
                endpoints,
            })
        })
        .collect()
}
