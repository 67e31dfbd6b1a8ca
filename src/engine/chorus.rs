use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::Engine;
use super::backlog::{BacklogReport, process_backlog};
use super::dispatch::{DispatchStats, Dispatcher};
use super::ledger::Ledger;
use super::pacing::{Pacing, Vocabulary};
use super::router::LiveRouter;
use crate::client::{ChannelId, ChannelRef, MessagingClient};
use crate::error::StartupError;
use crate::events::{Event, EventBus, Phase};

/// What the engine needs from the settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub channel: ChannelRef,
    pub vocabulary: Vocabulary,
    pub backlog_limit: usize,
    pub pacing: Pacing,
}

/// Totals reported after shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Sessions that opened successfully.
    pub sessions: usize,
    pub channel: Option<ChannelId>,
    pub backlog: BacklogReport,
    pub stats: DispatchStats,
    /// Distinct messages claimed during the run.
    pub processed: usize,
}

/// INIT → BACKFILL → LIVE → SHUTDOWN over a fixed set of accounts.
pub struct ChorusEngine {
    accounts: Vec<Arc<dyn MessagingClient>>,
    config: EngineConfig,
    ledger: Arc<Ledger>,
    events: Arc<EventBus>,
}

impl ChorusEngine {
    /// `accounts` in registration order; the first one that opens reads the
    /// backlog and resolves the channel.
    pub fn new(accounts: Vec<Arc<dyn MessagingClient>>, config: EngineConfig) -> Self {
        Self {
            accounts,
            config,
            ledger: Arc::new(Ledger::new()),
            events: Arc::new(EventBus::default()),
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        Arc::clone(&self.ledger)
    }

    fn enter(&self, phase: Phase) {
        info!(?phase, "entering phase");
        self.events.emit(Event::PhaseChanged(phase));
    }

    /// Open accounts in order, skipping any that fail.
    async fn open_sessions(&self, shutdown: &CancellationToken) -> Vec<Arc<dyn MessagingClient>> {
        let mut opened = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            let opened_account = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                opened_account = account.open() => opened_account,
            };
            match opened_account {
                Ok(()) => {
                    info!(session = account.name(), "loaded account");
                    opened.push(Arc::clone(account));
                }
                Err(e) => warn!(session = account.name(), error = %e, "skipping account"),
            }
        }
        opened
    }

    async fn run_opened(
        &self,
        sessions: &[Arc<dyn MessagingClient>],
        shutdown: &CancellationToken,
    ) -> Result<RunSummary, StartupError> {
        if shutdown.is_cancelled() {
            return Ok(RunSummary {
                sessions: sessions.len(),
                ..RunSummary::default()
            });
        }
        let Some(first) = sessions.first() else {
            error!("no accounts could be opened");
            return Err(StartupError::NoSessions);
        };

        let resolved = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                return Ok(RunSummary {
                    sessions: sessions.len(),
                    ..RunSummary::default()
                });
            }
            resolved = self.config.channel.resolve(first.as_ref()) => resolved,
        };
        let channel = match resolved {
            Ok(channel) => channel,
            Err(e) => {
                error!(channel = %self.config.channel, error = %e, "failed to resolve channel");
                return Err(e.into());
            }
        };
        info!(channel = %self.config.channel, id = %channel, "channel resolved");

        let dispatcher = Arc::new(Dispatcher::new(
            sessions.to_vec(),
            channel,
            self.config.vocabulary.clone(),
            self.config.pacing.clone(),
            Arc::clone(&self.ledger),
            Arc::clone(&self.events),
        ));

        let mut summary = RunSummary {
            sessions: sessions.len(),
            channel: Some(channel),
            ..RunSummary::default()
        };

        self.enter(Phase::Backfill);
        summary.backlog = process_backlog(
            first.as_ref(),
            &dispatcher,
            self.config.backlog_limit,
            shutdown,
        )
        .await;

        if !shutdown.is_cancelled() {
            self.enter(Phase::Live);
            let router = LiveRouter::new(sessions.to_vec(), Arc::clone(&dispatcher));
            let handle = router.start(shutdown).await;
            info!(channel = %self.config.channel, "monitoring channel, press Ctrl+C to stop");
            shutdown.cancelled().await;
            handle.join().await;
        }

        summary.stats = dispatcher.stats();
        summary.processed = self.ledger.len();
        Ok(summary)
    }
}

/// Close every session; a failure on one does not stop the others.
async fn release(sessions: &[Arc<dyn MessagingClient>]) {
    let closing = sessions.iter().map(|session| async move {
        if let Err(e) = session.close().await {
            warn!(session = session.name(), error = %e, "failed to release session");
        }
    });
    futures::future::join_all(closing).await;
}

#[async_trait]
impl Engine for ChorusEngine {
    async fn run(&self, shutdown: CancellationToken) -> Result<RunSummary, StartupError> {
        self.enter(Phase::Init);
        let sessions = self.open_sessions(&shutdown).await;

        let result = self.run_opened(&sessions, &shutdown).await;

        self.enter(Phase::Shutdown);
        release(&sessions).await;
        result
    }
}
