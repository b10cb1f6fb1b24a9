use anyhow::Result;
use futures::stream::{self, StreamExt};
use shared::types::{host_port, DiscoveredTarget, DiscoverySnapshot};
use crate::config::Config;
use crate::error::{chain, CycleError};
use crate::probe::Prober;
use crate::rancher::api::PublicEndpoint;
use crate::rancher::{candidates, Candidate, RancherClient, StackNames};

/// Builds the target snapshot of one discovery cycle
pub struct Discovery {
    rancher: RancherClient,
    prober: Prober,
    project: String,
    endpoint_label: String,
    labels_prefix: String,
    probe_concurrency: usize,
}

impl Discovery {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            rancher: RancherClient::new(&config.rancher)?,
            prober: Prober::new(&config.discovery)?,
            project: config.rancher.project.clone(),
            endpoint_label: config.discovery.endpoint_label.clone(),
            labels_prefix: config.discovery.labels_prefix.clone(),
            probe_concurrency: config.discovery.probe_concurrency.max(1),
        })
    }

    /// Run one cycle. Project and service lookups are fatal to the cycle;
    /// endpoints failing their probe or stack lookup are skipped.
    pub async fn run(&self) -> Result<DiscoverySnapshot, CycleError> {
        let project_id = self
            .rancher
            .project_id(&self.project)
            .await
            .map_err(|source| CycleError::ResolveProject {
                project: self.project.clone(),
                source,
            })?;

        let services = self
            .rancher
            .services(&project_id)
            .await
            .map_err(|source| CycleError::ListServices {
                project_id: project_id.clone(),
                source,
            })?;

        let candidates = candidates(services, &self.endpoint_label, &self.labels_prefix);
        tracing::debug!("Project {} has {} candidate services", project_id, candidates.len());

        let pending: Vec<(&Candidate, &PublicEndpoint, String)> = candidates
            .iter()
            .flat_map(|candidate| {
                candidate.endpoints.iter().map(move |endpoint| {
                    let url = self.prober.scrape_url(
                        &endpoint.ip_address,
                        endpoint.port,
                        &candidate.endpoint_path,
                    );
                    (candidate, endpoint, url)
                })
            })
            .collect();

        // Probe futures own their URLs; borrowed stream items make the cycle
        // future non-`Send`
        let prober = &self.prober;
        let urls: Vec<String> = pending.iter().map(|(_, _, url)| url.clone()).collect();

        // `buffered` yields in input order, keeping the snapshot deterministic
        let probes: Vec<_> = stream::iter(urls)
            .map(|url| async move { prober.probe(&url).await })
            .buffered(self.probe_concurrency)
            .collect()
            .await;

        let mut stacks = StackNames::new(&self.rancher);
        let mut snapshot = Vec::new();

        for ((candidate, endpoint, url), probe) in pending.iter().zip(probes) {
            if let Err(e) = probe {
                tracing::warn!("Skipping {} at {}: {}", candidate.name, url, chain(&e));
                continue;
            }

            let Some(link) = candidate.stack_link.as_deref() else {
                tracing::warn!("Skipping {} at {}: service has no stack link", candidate.name, url);
                continue;
            };

            let stack = match stacks.resolve(link).await {
                Ok(stack) => stack,
                Err(e) => {
                    tracing::warn!(
                        "Failed to fetch stack name of {} from {}: {}",
                        candidate.name,
                        link,
                        chain(&e)
                    );
                    continue;
                }
            };

            tracing::info!("Got service {}/{} on {}. {}", stack, candidate.name, endpoint.host_id, url);

            snapshot.push(DiscoveredTarget {
                stack,
                service: candidate.name.clone(),
                address: host_port(&endpoint.ip_address, endpoint.port),
                host_id: endpoint.host_id.clone(),
                labels: candidate.labels.clone(),
            });
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use serde_json::json;
    use crate::error::DiscoveryError;
    use crate::test_support::{test_config, MockRancher, MockScrape};

    fn service(mock: &MockRancher, name: &str, labels: serde_json::Value, ports: &[u16]) -> serde_json::Value {
        let endpoints: Vec<_> = ports
            .iter()
            .map(|port| json!({"ipAddress": "127.0.0.1", "port": port, "hostId": "host-a"}))
            .collect();
        json!({
            "name": name,
            "links": {"stack": mock.stack_link("1st5")},
            "launchConfig": {"labels": labels},
            "publicEndpoints": endpoints
        })
    }

    async fn infra_mock() -> MockRancher {
        let mock = MockRancher::spawn().await;
        mock.set_projects(json!({"type": "collection", "data": [{"id": "1p1"}]}));
        mock.set_stack("1st5", json!({"type": "stack", "name": "prod-stack"}));
        mock
    }

    #[tokio::test]
    async fn test_single_live_endpoint() {
        let mock = infra_mock().await;
        let scrape = MockScrape::spawn(200).await;
        mock.set_services(
            "1p1",
            json!({"data": [service(&mock, "web", json!({
                "prometheus.endpoint": "/metrics",
                "prometheus.labels.env": "prod",
                "other": "x"
            }), &[scrape.port()])]}),
        );

        let dir = tempfile::tempdir().unwrap();
        let discovery = Discovery::new(&test_config(&mock, dir.path().join("t.json"))).unwrap();
        let snapshot = discovery.run().await.unwrap();

        assert_eq!(
            snapshot,
            vec![DiscoveredTarget {
                stack: "prod-stack".to_string(),
                service: "web".to_string(),
                address: format!("127.0.0.1:{}", scrape.port()),
                host_id: "host-a".to_string(),
                labels: BTreeMap::from([("env".to_string(), "prod".to_string())]),
            }]
        );
        assert_eq!(scrape.hits(), 1);
    }

    #[tokio::test]
    async fn test_every_public_endpoint_is_a_target() {
        let mock = infra_mock().await;
        let first = MockScrape::spawn(200).await;
        let second = MockScrape::spawn(200).await;
        let dead = MockScrape::spawn(503).await;
        mock.set_services(
            "1p1",
            json!({"data": [
                service(&mock, "web", json!({"prometheus.endpoint": "/metrics"}),
                        &[first.port(), dead.port(), second.port()]),
                service(&mock, "db", json!({"io.rancher.container.pull_image": "always"}),
                        &[first.port()])
            ]}),
        );

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&mock, dir.path().join("t.json"));
        config.discovery.probe_concurrency = 4;
        let snapshot = Discovery::new(&config).unwrap().run().await.unwrap();

        let addresses: Vec<_> = snapshot.iter().map(|t| t.address.clone()).collect();
        assert_eq!(
            addresses,
            vec![
                format!("127.0.0.1:{}", first.port()),
                format!("127.0.0.1:{}", second.port()),
            ]
        );
        assert!(snapshot.iter().all(|t| t.service == "web"));
        // One stack lookup shared by both targets
        assert_eq!(mock.stack_hits("1st5"), 1);
    }

    #[tokio::test]
    async fn test_cycle_runs_on_spawned_task() {
        let mock = infra_mock().await;
        let first = MockScrape::spawn(200).await;
        let second = MockScrape::spawn(200).await;
        mock.set_services(
            "1p1",
            json!({"data": [service(&mock, "web", json!({"prometheus.endpoint": "/metrics"}),
                                    &[first.port(), second.port()])]}),
        );

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&mock, dir.path().join("t.json"));
        config.discovery.probe_concurrency = 2;
        let discovery = Discovery::new(&config).unwrap();

        let snapshot = tokio::spawn(async move { discovery.run().await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(first.hits() + second.hits(), 2);
    }

    #[tokio::test]
    async fn test_stack_failure_skips_target_only() {
        let mock = infra_mock().await;
        let scrape = MockScrape::spawn(200).await;
        let mut orphan = service(&mock, "orphan", json!({"prometheus.endpoint": "/metrics"}), &[scrape.port()]);
        orphan["links"]["stack"] = json!(mock.stack_link("gone"));
        mock.set_services(
            "1p1",
            json!({"data": [orphan, service(&mock, "web", json!({"prometheus.endpoint": "/metrics"}), &[scrape.port()])]}),
        );

        let dir = tempfile::tempdir().unwrap();
        let snapshot = Discovery::new(&test_config(&mock, dir.path().join("t.json")))
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].service, "web");
    }

    #[tokio::test]
    async fn test_project_failure_is_fatal() {
        let mock = MockRancher::spawn().await;
        mock.set_projects(json!({"type": "collection", "data": []}));

        let dir = tempfile::tempdir().unwrap();
        let result = Discovery::new(&test_config(&mock, dir.path().join("t.json")))
            .unwrap()
            .run()
            .await;

        assert!(matches!(
            result,
            Err(CycleError::ResolveProject { source: DiscoveryError::NotFound(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_service_listing_failure_is_fatal() {
        let mock = infra_mock().await;
        mock.set_services("1p1", json!({"type": "error", "message": "boom"}));

        let dir = tempfile::tempdir().unwrap();
        let result = Discovery::new(&test_config(&mock, dir.path().join("t.json")))
            .unwrap()
            .run()
            .await;

        assert!(matches!(
            result,
            Err(CycleError::ListServices { source: DiscoveryError::Remote(m), .. }) if m == "boom"
        ));
    }
}
