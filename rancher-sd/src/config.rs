use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::{ENDPOINT_LABEL, LABELS_PREFIX};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rancher: RancherConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub error_sink: ErrorSinkConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// `access_key:secret_key` sent as HTTP Basic
    #[default]
    Basic,
    Bearer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RancherConfig {
    /// Base URL of the Rancher server, e.g. `https://rancher.example.com`
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub auth_scheme: AuthScheme,
    /// Skip certificate verification for the Rancher API only
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_period")]
    pub period_secs: u64,
    #[serde(default = "default_endpoint_label")]
    pub endpoint_label: String,
    #[serde(default = "default_labels_prefix")]
    pub labels_prefix: String,
    #[serde(default = "default_probe_scheme")]
    pub probe_scheme: String,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub file: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorSinkConfig {
    /// Sentry DSN; no events are sent to Sentry when unset
    #[serde(default)]
    pub dsn: Option<String>,
    /// Webhook receiving error events as JSON
    #[serde(default)]
    pub url: Option<String>,
}

fn default_request_timeout() -> u64 {
    10
}

fn default_period() -> u64 {
    60
}

fn default_endpoint_label() -> String {
    ENDPOINT_LABEL.to_string()
}

fn default_labels_prefix() -> String {
    LABELS_PREFIX.to_string()
}

fn default_probe_scheme() -> String {
    "http".to_string()
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_probe_concurrency() -> usize {
    1
}

impl Default for RancherConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            project: String::new(),
            auth_scheme: AuthScheme::default(),
            accept_invalid_certs: false,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period(),
            endpoint_label: default_endpoint_label(),
            labels_prefix: default_labels_prefix(),
            probe_scheme: default_probe_scheme(),
            probe_timeout_secs: default_probe_timeout(),
            probe_concurrency: default_probe_concurrency(),
        }
    }
}

impl RancherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl DiscoveryConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load the file if present, then apply environment overrides and validate
    pub fn resolve(path: Option<&Path>, default_path: &Path) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if default_path.exists() => Self::load(default_path)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the `RANCHER_HOST`-style environment variables on top of the file
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(host) = var("RANCHER_HOST") {
            self.rancher.url = if host.contains("://") {
                host
            } else {
                format!("https://{}", host)
            };
        }
        if let Some(token) = var("RANCHER_TOKEN") {
            self.rancher.token = token;
        }
        if let Some(insecure) = var("RANCHER_INSECURE") {
            self.rancher.accept_invalid_certs = parse_flag(&insecure)
                .with_context(|| format!("Invalid RANCHER_INSECURE: {}", insecure))?;
        }
        if let Some(project) = var("RANCHER_PROJECT") {
            self.rancher.project = project;
        }
        if let Some(file) = var("FILE") {
            self.output.file = PathBuf::from(file);
        }
        if let Some(period) = var("PERIOD_SEC") {
            self.discovery.period_secs = period
                .parse()
                .with_context(|| format!("Invalid PERIOD_SEC: {}", period))?;
        }
        if let Some(dsn) = var("SENTRY_DSN") {
            self.error_sink.dsn = Some(dsn);
        }
        if let Some(url) = var("ERROR_SINK_URL") {
            self.error_sink.url = Some(url);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.rancher.url.is_empty() {
            bail!("rancher.url (or RANCHER_HOST) must be set");
        }
        if self.rancher.token.is_empty() {
            bail!("rancher.token (or RANCHER_TOKEN) must be set");
        }
        if self.rancher.project.is_empty() {
            bail!("rancher.project (or RANCHER_PROJECT) must be set");
        }
        if self.output.file.as_os_str().is_empty() {
            bail!("output.file (or FILE) must be set");
        }
        if self.discovery.period_secs == 0 {
            bail!("discovery.period_secs must be positive");
        }
        if self.discovery.probe_concurrency == 0 {
            bail!("discovery.probe_concurrency must be positive");
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => bail!("expected true or false"),
    }
}
