use std::time::Duration;
use tokio_util::sync::CancellationToken;
use crate::discovery::Discovery;
use crate::error::CycleError;
use crate::sink::{ErrorSink, Stage};
use crate::writer::{Publish, TargetWriter};

/// What a single cycle ended with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Published(Publish),
    DiscoveryFailed(Stage),
    PublishFailed,
}

/// Discover, then publish if changed. Every failure goes to the sink; none
/// escapes.
pub async fn run_cycle(
    discovery: &Discovery,
    writer: &mut TargetWriter,
    sink: &ErrorSink,
) -> CycleOutcome {
    let snapshot = match discovery.run().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let stage = match &e {
                CycleError::ResolveProject { .. } => Stage::ResolveProject,
                CycleError::ListServices { .. } => Stage::ListServices,
            };
            sink.report(stage, &e).await;
            return CycleOutcome::DiscoveryFailed(stage);
        }
    };

    match writer.publish(snapshot) {
        Ok(outcome) => CycleOutcome::Published(outcome),
        Err(e) => {
            sink.report(Stage::Publish, &e).await;
            CycleOutcome::PublishFailed
        }
    }
}

/// Run cycles back to back, sleeping `period` after each one completes, until
/// cancelled. A cycle in flight always finishes before the loop exits.
pub async fn run(
    discovery: Discovery,
    mut writer: TargetWriter,
    sink: ErrorSink,
    period: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        "Publishing targets to {} every {:?}",
        writer.path().display(),
        period
    );

    loop {
        let outcome = run_cycle(&discovery, &mut writer, &sink).await;
        tracing::debug!("Cycle finished: {:?}", outcome);

        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = cancel.cancelled() => {
                tracing::info!("Scheduler shutting down");
                break;
            }
        }
    }
}
