use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::dispatch::{DispatchOutcome, Dispatcher};
use super::pause;
use crate::client::MessagingClient;
use crate::error::RetrievalError;

/// How far the backlog pass got.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacklogReport {
    pub retrieved: usize,
    pub dispatched: usize,
    /// Set when the history could not be fetched.
    pub error: Option<RetrievalError>,
    pub interrupted: bool,
}

/// Walk up to `limit` historical messages through `session`, dispatching each
/// in the order the service returns them. Never fails; a retrieval error
/// just ends the pass.
pub async fn process_backlog(
    session: &dyn MessagingClient,
    dispatcher: &Dispatcher,
    limit: usize,
    shutdown: &CancellationToken,
) -> BacklogReport {
    let mut report = BacklogReport::default();
    if limit == 0 {
        info!("backlog skipped");
        return report;
    }

    info!(session = session.name(), limit, "processing existing messages");

    let fetched = tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            report.interrupted = true;
            return report;
        }
        fetched = session.fetch_history(dispatcher.channel(), limit) => fetched,
    };

    let messages = match fetched {
        Ok(messages) => messages,
        Err(e) => {
            error!(session = session.name(), error = %e, "failed to fetch backlog");
            report.error = Some(e);
            return report;
        }
    };
    report.retrieved = messages.len();

    for message in messages.iter().take(limit) {
        match dispatcher.dispatch(message.id, shutdown).await {
            DispatchOutcome::Interrupted => {
                report.interrupted = true;
                return report;
            }
            DispatchOutcome::Completed { .. } => report.dispatched += 1,
            DispatchOutcome::AlreadyProcessed => {}
        }
        if !pause(dispatcher.pacing().message_gap(), shutdown).await {
            report.interrupted = true;
            return report;
        }
    }

    info!(
        retrieved = report.retrieved,
        dispatched = report.dispatched,
        "finished processing existing messages"
    );
    report
}
