use std::path::PathBuf;
use reqwest::StatusCode;
use thiserror::Error;

/// Failures that abort a whole discovery cycle
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("rancher returned an error: {0}")]
    Remote(String),

    #[error("project {0:?} not found")]
    NotFound(String),

    #[error("several projects are named {0:?}")]
    AmbiguousName(String),

    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: StatusCode },

    #[error("malformed response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A scrape endpoint did not pass its liveness probe
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe failed")]
    Transport(#[from] reqwest::Error),

    #[error("probe answered {0}, expected 200")]
    Status(StatusCode),
}

/// A stack link could not be turned into a display name
#[derive(Debug, Error)]
pub enum StackError {
    #[error(transparent)]
    Lookup(#[from] DiscoveryError),

    #[error("stack has no name")]
    Unnamed,
}

/// Errors that abort a discovery cycle, tagged with the failing step
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to resolve project {project:?}")]
    ResolveProject {
        project: String,
        #[source]
        source: DiscoveryError,
    },

    #[error("failed to list services of project {project_id}")]
    ListServices {
        project_id: String,
        #[source]
        source: DiscoveryError,
    },
}

/// Publishing the target file failed; the previous snapshot stays current
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to serialize targets")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Display strings of the sources of `err`, outermost first
pub fn causes(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    causes
}

/// Joins a message and its causes as `outer: inner: root`
pub fn render(message: &str, causes: &[String]) -> String {
    std::iter::once(message)
        .chain(causes.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(": ")
}

/// Renders an error and its sources as `outer: inner: root`
pub fn chain(err: &(dyn std::error::Error + 'static)) -> String {
    render(&err.to_string(), &causes(err))
}
