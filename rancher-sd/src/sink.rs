use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::config::ErrorSinkConfig;
use crate::error;

/// Step of the cycle an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ResolveProject,
    ListServices,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolveProject => "resolve_project",
            Stage::ListServices => "list_services",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub timestamp: DateTime<Utc>,
    pub server_name: String,
    pub stage: Stage,
    pub message: String,
    /// Source chain, outermost first
    pub causes: Vec<String>,
}

/// Commands sent to the reporter task
#[derive(Debug)]
pub enum SinkCommand {
    Report(ErrorEvent),
    Shutdown(oneshot::Sender<()>),
}

/// Handle for routing cycle errors to the reporter task
#[derive(Clone)]
pub struct ErrorSink {
    tx: mpsc::Sender<SinkCommand>,
    server_name: Arc<str>,
}

impl ErrorSink {
    /// Spawn the reporter task. Events are always logged, sent to Sentry when
    /// a client is bound (see [`init_sentry`]) and POSTed as JSON when a
    /// webhook URL is configured.
    pub fn spawn(config: &ErrorSinkConfig) -> Result<(Self, JoinHandle<()>)> {
        let webhook = match &config.url {
            Some(url) => {
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(10))
                    .build()
                    .context("Failed to build error sink HTTP client")?;
                Some((client, url.clone()))
            }
            None => None,
        };

        let (sink, mut rx) = Self::channel();

        let handle = tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    SinkCommand::Report(event) => deliver(&event, webhook.as_ref()).await,
                    SinkCommand::Shutdown(done) => {
                        // Drain whatever was queued before the shutdown request
                        while let Ok(SinkCommand::Report(event)) = rx.try_recv() {
                            deliver(&event, webhook.as_ref()).await;
                        }
                        tracing::info!("Error sink shutting down");
                        let _ = done.send(());
                        break;
                    }
                }
            }
        });

        Ok((sink, handle))
    }

    /// A sink whose commands land on the returned receiver
    pub fn channel() -> (Self, mpsc::Receiver<SinkCommand>) {
        let (tx, rx) = mpsc::channel(64);
        let server_name = hostname::get()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let sink = Self {
            tx,
            server_name: Arc::from(server_name),
        };
        (sink, rx)
    }

    /// Report an error. Never fails; a closed sink only logs.
    pub async fn report(&self, stage: Stage, err: &(dyn std::error::Error + Send + Sync + 'static)) {
        let event = ErrorEvent {
            timestamp: Utc::now(),
            server_name: self.server_name.to_string(),
            stage,
            message: err.to_string(),
            causes: error::causes(err),
        };

        if self.tx.send(SinkCommand::Report(event)).await.is_err() {
            tracing::error!("[{}] {} (error sink closed)", stage, error::chain(err));
        }
    }

    /// Flush pending events and stop the reporter task
    pub async fn shutdown(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(SinkCommand::Shutdown(done))
            .await
            .context("Error sink already stopped")?;
        rx.await.context("Error sink stopped before acknowledging shutdown")?;
        Ok(())
    }
}

/// Bind a Sentry client for the lifetime of the returned guard when a DSN is
/// configured. Dropping the guard flushes queued events.
pub fn init_sentry(config: &ErrorSinkConfig) -> Result<Option<sentry::ClientInitGuard>> {
    let Some(dsn) = &config.dsn else {
        return Ok(None);
    };
    let dsn: sentry::types::Dsn = dsn.parse().context("Invalid Sentry DSN")?;

    let guard = sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: sentry::release_name!(),
        ..Default::default()
    });
    tracing::info!("Reporting errors to Sentry");
    Ok(Some(guard))
}

/// Sentry event carrying the stage as a tag and the error chain as
/// exceptions, root cause first
fn sentry_event(event: &ErrorEvent) -> sentry::protocol::Event<'static> {
    let exceptions: Vec<_> = std::iter::once(&event.message)
        .chain(&event.causes)
        .rev()
        .map(|value| sentry::protocol::Exception {
            ty: event.stage.to_string(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect();

    sentry::protocol::Event {
        level: sentry::Level::Error,
        timestamp: event.timestamp.into(),
        server_name: Some(event.server_name.clone().into()),
        tags: BTreeMap::from([("stage".to_string(), event.stage.to_string())]),
        exception: exceptions.into(),
        ..Default::default()
    }
}

async fn deliver(event: &ErrorEvent, webhook: Option<&(reqwest::Client, String)>) {
    tracing::error!("[{}] {}", event.stage, error::render(&event.message, &event.causes));

    // No-op unless a client was bound by `init_sentry`
    sentry::capture_event(sentry_event(event));

    let Some((client, url)) = webhook else {
        return;
    };

    let result = client
        .post(url)
        .json(event)
        .send()
        .await
        .and_then(|response| response.error_for_status());
    if let Err(e) = result {
        tracing::warn!("Failed to deliver error event to {}: {}", url, e);
    }
}
