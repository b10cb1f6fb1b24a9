use std::collections::HashMap;
use crate::error::StackError;
use super::api::Stack;
use super::client::RancherClient;

impl RancherClient {
    /// Fetch the display name behind a service's stack link
    pub async fn stack_name(&self, link: &str) -> Result<String, StackError> {
        let stack: Stack = self.get_json(link, &[]).await?;
        stack
            .name
            .filter(|name| !name.is_empty())
            .ok_or(StackError::Unnamed)
    }
}

/// Per-cycle memo of stack names. Only successful lookups are kept, so a
/// failed link is retried by the next target sharing it.
pub struct StackNames<'a> {
    client: &'a RancherClient,
    names: HashMap<String, String>,
}

impl<'a> StackNames<'a> {
    pub fn new(client: &'a RancherClient) -> Self {
        Self {
            client,
            names: HashMap::new(),
        }
    }

    pub async fn resolve(&mut self, link: &str) -> Result<String, StackError> {
        if let Some(name) = self.names.get(link) {
            return Ok(name.clone());
        }
        let name = self.client.stack_name(link).await?;
        self.names.insert(link.to_string(), name.clone());
        Ok(name)
    }
}
