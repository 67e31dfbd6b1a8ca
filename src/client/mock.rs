use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{ChannelId, Message, MessageId, MessagingClient};
use crate::error::{ResolutionError, RetrievalError, SessionError, SubmissionError};

/// A call observed by [`MockClient`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open,
    Close,
    Resolve(String),
    FetchHistory { limit: usize },
    Submit {
        message: MessageId,
        symbol: String,
        at: Instant,
    },
    Subscribe,
}

/// An operation that never completes, as a hung network call would.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    Open,
    Resolve,
    Subscribe,
}

/// A scripted session for tests. Serves fixed history, delivers queued live
/// messages on subscribe, and records every call.
pub struct MockClient {
    name: String,
    channel: ChannelId,
    history: Vec<Message>,
    live: Vec<Message>,
    fail_open: bool,
    fail_close: bool,
    fail_resolve: bool,
    fail_history: bool,
    fail_submit: bool,
    stall: Option<Stall>,
    failures_left: AtomicUsize,
    open: AtomicBool,
    calls: Mutex<Vec<Call>>,
    live_tx: Mutex<Option<mpsc::Sender<Message>>>,
}

impl MockClient {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            channel: ChannelId(-100),
            history: Vec::new(),
            live: Vec::new(),
            fail_open: false,
            fail_close: false,
            fail_resolve: false,
            fail_history: false,
            fail_submit: false,
            stall: None,
            failures_left: AtomicUsize::new(0),
            open: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            live_tx: Mutex::new(None),
        }
    }

    /// Channel id returned when resolving any handle.
    pub fn with_channel(mut self, channel: ChannelId) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_history(mut self, ids: &[i64]) -> Self {
        let history = ids.iter().map(|&id| self.message(id)).collect();
        self.history = history;
        self
    }

    /// Messages delivered as soon as the session subscribes.
    pub fn with_live(mut self, ids: &[i64]) -> Self {
        let live = ids.iter().map(|&id| self.message(id)).collect();
        self.live = live;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn failing_resolution(mut self) -> Self {
        self.fail_resolve = true;
        self
    }

    pub fn failing_history(mut self) -> Self {
        self.fail_history = true;
        self
    }

    /// Every submission fails.
    pub fn failing_submissions(mut self) -> Self {
        self.fail_submit = true;
        self
    }

    /// The first `n` submissions fail, later ones succeed.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Make `op` hang until the caller gives up on it.
    pub fn stalling(mut self, op: Stall) -> Self {
        self.stall = Some(op);
        self
    }

    /// Deliver a live message to an active subscription.
    /// Returns false if nothing is subscribed.
    pub fn push_live(&self, id: i64) -> bool {
        let message = self.message(id);
        let tx = self.live_tx.lock().unwrap();
        match tx.as_ref() {
            Some(tx) => tx.try_send(message).is_ok(),
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Successful and failed submissions alike, as (message, symbol).
    pub fn submissions(&self) -> Vec<(MessageId, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Submit {
                    message, symbol, ..
                } => Some((message, symbol)),
                _ => None,
            })
            .collect()
    }

    pub fn submission_times(&self) -> Vec<Instant> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Submit { at, .. } => Some(at),
                _ => None,
            })
            .collect()
    }

    fn message(&self, id: i64) -> Message {
        Message {
            id: MessageId(id),
            channel: self.channel,
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn maybe_stall(&self, op: Stall) {
        if self.stall == Some(op) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl MessagingClient for MockClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> Result<(), SessionError> {
        self.record(Call::Open);
        self.maybe_stall(Stall::Open).await;
        if self.fail_open {
            return Err(SessionError::Open {
                session: self.name.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.record(Call::Close);
        self.live_tx.lock().unwrap().take();
        self.open.store(false, Ordering::SeqCst);
        if self.fail_close {
            return Err(SessionError::Close {
                session: self.name.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    async fn resolve_channel(&self, handle: &str) -> Result<ChannelId, ResolutionError> {
        self.record(Call::Resolve(handle.to_string()));
        self.maybe_stall(Stall::Resolve).await;
        if self.fail_resolve {
            return Err(ResolutionError::NotFound {
                handle: handle.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(self.channel)
    }

    async fn fetch_history(
        &self,
        _channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<Message>, RetrievalError> {
        self.record(Call::FetchHistory { limit });
        if self.fail_history {
            return Err(RetrievalError::Transport("scripted failure".to_string()));
        }
        Ok(self.history.iter().take(limit).copied().collect())
    }

    async fn submit_reaction(
        &self,
        _channel: ChannelId,
        message: MessageId,
        symbol: &str,
    ) -> Result<(), SubmissionError> {
        self.record(Call::Submit {
            message,
            symbol: symbol.to_string(),
            at: Instant::now(),
        });
        let scripted = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if self.fail_submit || scripted {
            return Err(SubmissionError::Rejected("scripted failure".to_string()));
        }
        Ok(())
    }

    async fn subscribe(&self, _channel: ChannelId) -> Result<mpsc::Receiver<Message>, SessionError> {
        self.record(Call::Subscribe);
        self.maybe_stall(Stall::Subscribe).await;
        let (tx, rx) = mpsc::channel(64);
        for message in &self.live {
            let _ = tx.try_send(*message);
        }
        *self.live_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }
}
