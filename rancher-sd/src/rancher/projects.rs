use crate::error::DiscoveryError;
use super::api::{Collection, Project};
use super::client::RancherClient;

impl RancherClient {
    /// Resolve a project name to its id. The name must match exactly one
    /// project.
    pub async fn project_id(&self, name: &str) -> Result<String, DiscoveryError> {
        let url = self.api_url("/projects");
        let projects: Collection<Project> = self.get_json(&url, &[("name", name)]).await?;

        let mut matches = projects.data.into_iter();
        match (matches.next(), matches.next()) {
            (Some(project), None) => Ok(project.id),
            (None, _) => Err(DiscoveryError::NotFound(name.to_string())),
            (Some(_), Some(_)) => Err(DiscoveryError::AmbiguousName(name.to_string())),
        }
    }
}
