use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ledger::Ledger;
use super::pacing::{Pacing, Vocabulary};
use super::pause;
use crate::client::{ChannelId, MessageId, MessagingClient};
use crate::error::SubmissionError;
use crate::events::{Event, EventBus};

/// What a single `dispatch` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The id was claimed earlier; nothing was sent.
    AlreadyProcessed,
    /// Every session was visited. `exhausted` names sessions that gave up.
    Completed {
        reactions: usize,
        exhausted: Vec<String>,
    },
    /// Shutdown arrived mid-dispatch.
    Interrupted,
}

/// Running totals across all dispatches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub messages: u64,
    pub reactions: u64,
    pub exhausted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    messages: AtomicU64,
    reactions: AtomicU64,
    exhausted: AtomicU64,
}

enum SessionResult {
    Done,
    Exhausted,
    Interrupted,
}

enum TryError {
    Submission(SubmissionError),
    Interrupted,
}

/// Fans reactions for one message across every session, in registration order.
pub struct Dispatcher {
    sessions: Vec<Arc<dyn MessagingClient>>,
    channel: ChannelId,
    vocabulary: Vocabulary,
    pacing: Pacing,
    ledger: Arc<Ledger>,
    events: Arc<EventBus>,
    counters: Counters,
}

impl Dispatcher {
    pub fn new(
        sessions: Vec<Arc<dyn MessagingClient>>,
        channel: ChannelId,
        vocabulary: Vocabulary,
        pacing: Pacing,
        ledger: Arc<Ledger>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            sessions,
            channel,
            vocabulary,
            pacing,
            ledger,
            events,
            counters: Counters::default(),
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            messages: self.counters.messages.load(Ordering::Relaxed),
            reactions: self.counters.reactions.load(Ordering::Relaxed),
            exhausted: self.counters.exhausted.load(Ordering::Relaxed),
        }
    }

    /// React to `message` from every session. At most once per id per run;
    /// never fails, only reports.
    pub async fn dispatch(&self, message: MessageId, shutdown: &CancellationToken) -> DispatchOutcome {
        if !self.ledger.claim(message) {
            debug!(message = %message, "already processed, skipping");
            self.events.emit(Event::DuplicateSkipped { message });
            return DispatchOutcome::AlreadyProcessed;
        }

        self.counters.messages.fetch_add(1, Ordering::Relaxed);
        self.events.emit(Event::DispatchStarted { message });
        debug!(message = %message, sessions = self.sessions.len(), "dispatching");

        let mut reactions = 0;
        let mut exhausted = Vec::new();

        for session in &self.sessions {
            match self
                .react_as(session.as_ref(), message, &mut reactions, shutdown)
                .await
            {
                SessionResult::Done => {}
                SessionResult::Exhausted => exhausted.push(session.name().to_string()),
                SessionResult::Interrupted => return DispatchOutcome::Interrupted,
            }
            if !pause(self.pacing.session_gap(), shutdown).await {
                return DispatchOutcome::Interrupted;
            }
        }

        DispatchOutcome::Completed {
            reactions,
            exhausted,
        }
    }

    async fn react_as(
        &self,
        session: &dyn MessagingClient,
        message: MessageId,
        sent: &mut usize,
        shutdown: &CancellationToken,
    ) -> SessionResult {
        let max = self.pacing.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let subset = self.pacing.pick_reactions(&self.vocabulary);

            let err = match self.attempt(session, message, &subset, sent, shutdown).await {
                Ok(()) => return SessionResult::Done,
                Err(TryError::Interrupted) => return SessionResult::Interrupted,
                Err(TryError::Submission(err)) => err,
            };

            if attempt >= max {
                error!(
                    session = session.name(),
                    message = %message,
                    error = %err,
                    "giving up after {max} attempts"
                );
                self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
                self.events.emit(Event::SessionExhausted {
                    session: session.name().to_string(),
                    message,
                });
                return SessionResult::Exhausted;
            }

            let delay = self.pacing.retry_backoff(attempt);
            warn!(
                session = session.name(),
                message = %message,
                error = %err,
                "retry {attempt}/{max} in {:.0}s",
                delay.as_secs_f64()
            );
            self.events.emit(Event::RetryScheduled {
                session: session.name().to_string(),
                message,
                attempt,
                delay,
            });
            if !pause(delay, shutdown).await {
                return SessionResult::Interrupted;
            }
        }
    }

    /// One try: send each symbol in turn, stop at the first failure.
    async fn attempt(
        &self,
        session: &dyn MessagingClient,
        message: MessageId,
        subset: &[String],
        sent: &mut usize,
        shutdown: &CancellationToken,
    ) -> Result<(), TryError> {
        for symbol in subset {
            let submitted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(TryError::Interrupted),
                submitted = session.submit_reaction(self.channel, message, symbol) => submitted,
            };
            submitted.map_err(TryError::Submission)?;

            *sent += 1;
            self.counters.reactions.fetch_add(1, Ordering::Relaxed);
            info!(session = session.name(), message = %message, symbol = %symbol, "reacted");
            self.events.emit(Event::ReactionSent {
                session: session.name().to_string(),
                message,
                symbol: symbol.clone(),
            });

            if !pause(self.pacing.reaction_gap(), shutdown).await {
                return Err(TryError::Interrupted);
            }
        }
        Ok(())
    }
}
