//! [`MessagingClient`] over the Telegram Bot API.
//!
//! Each account is a bot token. Bots cannot page through channel history, so
//! the backlog is whatever `channel_post` updates the server still holds for
//! the bot (unconfirmed updates are kept for about a day). A subscription
//! only delivers posts that arrive after that backlog has been drained, or
//! after it was discarded when no backlog was read.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChannelId, Message, MessageId, MessagingClient};
use crate::error::{ResolutionError, RetrievalError, SessionError, SubmissionError};

/// Upper bound on `getUpdates` rounds when draining the backlog.
const MAX_DRAIN_ROUNDS: usize = 50;

/// Buffered live messages per session.
const LIVE_BUFFER: usize = 256;

/// Connection settings, read from the `telegram` section of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
    /// Timeout for every other request.
    pub request_timeout_secs: u64,
    /// Pause after a failed long-poll.
    pub poll_retry_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
            request_timeout_secs: 15,
            poll_retry_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Me {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Post {
    message_id: i64,
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    channel_post: Option<Post>,
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Rejected(String),
}

/// Posts of `channel` in `updates`, oldest first.
fn channel_posts(updates: &[Update], channel: ChannelId) -> Vec<Message> {
    updates
        .iter()
        .filter_map(|u| u.channel_post.as_ref())
        .filter(|post| post.chat.id == channel.0)
        .map(|post| Message {
            id: MessageId(post.message_id),
            channel,
        })
        .collect()
}

/// The HTTP side of one bot, shared with its poller task.
struct BotApi {
    http: reqwest::Client,
    endpoint: String,
    request_timeout: Duration,
    offset: AtomicI64,
}

impl BotApi {
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .post(format!("{}/{}", self.endpoint, method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.without_url().to_string()))?;

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ApiError::Transport(e.without_url().to_string()))?;

        match envelope {
            Envelope {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            Envelope { description, .. } => Err(ApiError::Rejected(
                description.unwrap_or_else(|| format!("{method} failed")),
            )),
        }
    }

    /// Fetch the next batch of channel posts and confirm everything before it.
    async fn updates(&self, poll_timeout: Duration) -> Result<Vec<Update>, ApiError> {
        let body = json!({
            "offset": self.offset.load(Ordering::SeqCst),
            "timeout": poll_timeout.as_secs(),
            "allowed_updates": ["channel_post"],
        });
        let updates: Vec<Update> = self
            .call("getUpdates", &body, poll_timeout + self.request_timeout)
            .await?;
        self.confirm(&updates);
        Ok(updates)
    }

    /// Forget every pending update. A negative offset asks the server for the
    /// tail of its queue and drops everything before it; the next poll then
    /// confirms the tail itself.
    async fn skip_pending(&self) -> Result<(), ApiError> {
        let body = json!({
            "offset": -1,
            "timeout": 0,
            "allowed_updates": ["channel_post"],
        });
        let updates: Vec<Update> = self
            .call("getUpdates", &body, self.request_timeout)
            .await?;
        self.confirm(&updates);
        Ok(())
    }

    fn confirm(&self, updates: &[Update]) {
        if let Some(last) = updates.last() {
            self.offset.fetch_max(last.update_id + 1, Ordering::SeqCst);
        }
    }
}

/// One bot account.
pub struct TelegramClient {
    name: String,
    api: Arc<BotApi>,
    poll_timeout: Duration,
    poll_retry: Duration,
    /// Set once the queue holds nothing older than the current run.
    caught_up: AtomicBool,
    shutdown: CancellationToken,
}

impl TelegramClient {
    pub fn new(name: &str, token: &str, config: &TelegramConfig) -> Self {
        let api = BotApi {
            http: reqwest::Client::new(),
            endpoint: format!("{}/bot{}", config.api_base.trim_end_matches('/'), token),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            offset: AtomicI64::new(0),
        };
        Self {
            name: name.to_string(),
            api: Arc::new(api),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            poll_retry: Duration::from_secs(config.poll_retry_secs),
            caught_up: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl MessagingClient for TelegramClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> Result<(), SessionError> {
        let me: Me = self
            .api
            .call("getMe", &json!({}), self.api.request_timeout)
            .await
            .map_err(|e| SessionError::Open {
                session: self.name.clone(),
                reason: e.to_string(),
            })?;
        info!(
            session = %self.name,
            bot = me.username.as_deref().unwrap_or("?"),
            "session opened"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.shutdown.cancel();
        debug!(session = %self.name, "session closed");
        Ok(())
    }

    async fn resolve_channel(&self, handle: &str) -> Result<ChannelId, ResolutionError> {
        let chat: Chat = self
            .api
            .call("getChat", &json!({ "chat_id": handle }), self.api.request_timeout)
            .await
            .map_err(|e| match e {
                ApiError::Transport(reason) => ResolutionError::Transport(reason),
                ApiError::Rejected(reason) => ResolutionError::NotFound {
                    handle: handle.to_string(),
                    reason,
                },
            })?;
        Ok(ChannelId(chat.id))
    }

    async fn fetch_history(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<Message>, RetrievalError> {
        let mut messages = Vec::new();
        for _ in 0..MAX_DRAIN_ROUNDS {
            let batch = self
                .api
                .updates(Duration::ZERO)
                .await
                .map_err(|e| match e {
                    ApiError::Transport(reason) => RetrievalError::Transport(reason),
                    ApiError::Rejected(reason) => RetrievalError::Rejected(reason),
                })?;
            if batch.is_empty() {
                break;
            }
            messages.extend(channel_posts(&batch, channel));
        }
        self.caught_up.store(true, Ordering::SeqCst);
        messages.reverse();
        messages.truncate(limit);
        Ok(messages)
    }

    async fn submit_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        symbol: &str,
    ) -> Result<(), SubmissionError> {
        let body = json!({
            "chat_id": channel.0,
            "message_id": message.0,
            "reaction": [{ "type": "emoji", "emoji": symbol }],
        });
        let _: bool = self
            .api
            .call("setMessageReaction", &body, self.api.request_timeout)
            .await
            .map_err(|e| match e {
                ApiError::Transport(reason) => SubmissionError::Transport(reason),
                ApiError::Rejected(reason) => SubmissionError::Rejected(reason),
            })?;
        Ok(())
    }

    async fn subscribe(&self, channel: ChannelId) -> Result<mpsc::Receiver<Message>, SessionError> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::Subscribe {
                session: self.name.clone(),
                reason: "session already closed".to_string(),
            });
        }

        if !self.caught_up.swap(true, Ordering::SeqCst) {
            self.api.skip_pending().await.map_err(|e| {
                self.caught_up.store(false, Ordering::SeqCst);
                SessionError::Subscribe {
                    session: self.name.clone(),
                    reason: e.to_string(),
                }
            })?;
            debug!(session = %self.name, "discarded pending updates");
        }

        let (tx, rx) = mpsc::channel(LIVE_BUFFER);
        let api = Arc::clone(&self.api);
        let shutdown = self.shutdown.clone();
        let poll_timeout = self.poll_timeout;
        let poll_retry = self.poll_retry;
        let name = self.name.clone();

        tokio::spawn(async move {
            loop {
                let polled = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    polled = api.updates(poll_timeout) => polled,
                };
                match polled {
                    Ok(updates) => {
                        for message in channel_posts(&updates, channel) {
                            if tx.send(message).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(session = %name, error = %e, "long-poll failed");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(poll_retry) => {}
                        }
                    }
                }
            }
            debug!(session = %name, "poller stopped");
        });

        Ok(rx)
    }
}
