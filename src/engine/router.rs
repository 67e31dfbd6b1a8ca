use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatch::Dispatcher;
use super::pause;
use crate::client::{Message, MessagingClient};

/// Routes newly posted channel messages from every session into the shared
/// dispatcher. Each message is handled in its own task, so a slow dispatch
/// never holds up the next arrival.
pub struct LiveRouter {
    sessions: Vec<Arc<dyn MessagingClient>>,
    dispatcher: Arc<Dispatcher>,
}

/// The running listeners, one per subscribed session.
pub struct RouterHandle {
    listeners: JoinSet<()>,
    subscribed: usize,
}

impl RouterHandle {
    /// Number of sessions whose subscription succeeded.
    pub fn subscribed(&self) -> usize {
        self.subscribed
    }

    /// Wait for every listener and its in-flight dispatches to finish.
    /// Listeners stop when the shutdown token passed to `start` fires.
    pub async fn join(mut self) {
        while let Some(done) = self.listeners.join_next().await {
            if let Err(e) = done {
                error!(error = %e, "listener task failed");
            }
        }
    }
}

impl LiveRouter {
    pub fn new(sessions: Vec<Arc<dyn MessagingClient>>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            sessions,
            dispatcher,
        }
    }

    /// Subscribe once per session. A session that cannot subscribe is logged
    /// and left out; the others still run.
    pub async fn start(&self, shutdown: &CancellationToken) -> RouterHandle {
        let channel = self.dispatcher.channel();
        let mut listeners = JoinSet::new();

        for session in &self.sessions {
            let subscribed = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                subscribed = session.subscribe(channel) => subscribed,
            };
            match subscribed {
                Ok(rx) => {
                    debug!(session = session.name(), channel = %channel, "subscribed");
                    listeners.spawn(listen(
                        session.name().to_string(),
                        rx,
                        Arc::clone(&self.dispatcher),
                        shutdown.clone(),
                    ));
                }
                Err(e) => warn!(session = session.name(), error = %e, "subscription failed"),
            }
        }

        let subscribed = listeners.len();
        if subscribed == 0 {
            error!("no session could subscribe, live messages will be missed");
        } else {
            info!(sessions = subscribed, "listening for new messages");
        }

        RouterHandle {
            listeners,
            subscribed,
        }
    }
}

async fn listen(
    session: String,
    mut rx: mpsc::Receiver<Message>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    let mut inflight = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(done) = inflight.join_next(), if !inflight.is_empty() => {
                if let Err(e) = done {
                    error!(session = %session, error = %e, "message handler failed");
                }
            }
            received = rx.recv() => match received {
                Some(message) if message.channel != dispatcher.channel() => {
                    debug!(session = %session, channel = %message.channel, "ignoring foreign channel");
                }
                Some(message) => {
                    debug!(session = %session, message = %message.id, "new message");
                    inflight.spawn(handle(message, Arc::clone(&dispatcher), shutdown.clone()));
                }
                None => {
                    debug!(session = %session, "subscription closed");
                    break;
                }
            },
        }
    }

    while inflight.join_next().await.is_some() {}
}

async fn handle(message: Message, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) {
    if !pause(dispatcher.pacing().jitter(), &shutdown).await {
        return;
    }
    dispatcher.dispatch(message.id, &shutdown).await;
}
