pub mod mock;
pub mod telegram;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{ResolutionError, RetrievalError, SessionError, SubmissionError};

/// Resolved numeric identifier of the target channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a message within the target channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A channel message as seen by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub channel: ChannelId,
}

/// How the channel is named in the settings: a public `@handle` or a
/// numeric id (given either as a JSON number or a string).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ChannelRef {
    Id(i64),
    Name(String),
}

impl ChannelRef {
    /// Resolve to a [`ChannelId`]. Handles go through the session; numeric
    /// ids never touch the network.
    pub async fn resolve(
        &self,
        session: &dyn MessagingClient,
    ) -> Result<ChannelId, ResolutionError> {
        match self {
            ChannelRef::Id(id) => Ok(ChannelId(*id)),
            ChannelRef::Name(name) if name.starts_with('@') => {
                session.resolve_channel(name).await
            }
            ChannelRef::Name(name) => name
                .trim()
                .parse::<i64>()
                .map(ChannelId)
                .map_err(|_| ResolutionError::Malformed(name.clone())),
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRef::Id(id) => write!(f, "{id}"),
            ChannelRef::Name(name) => f.write_str(name),
        }
    }
}

/// One authenticated account. Everything the engine does on the remote
/// service goes through this trait.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Session name, unique per run.
    fn name(&self) -> &str;

    async fn open(&self) -> Result<(), SessionError>;

    /// Release the session. Stops any subscription it started.
    async fn close(&self) -> Result<(), SessionError>;

    async fn resolve_channel(&self, handle: &str) -> Result<ChannelId, ResolutionError>;

    /// Up to `limit` historical messages, in the order the service returns them.
    async fn fetch_history(
        &self,
        channel: ChannelId,
        limit: usize,
    ) -> Result<Vec<Message>, RetrievalError>;

    async fn submit_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        symbol: &str,
    ) -> Result<(), SubmissionError>;

    /// Start delivering new messages of `channel`. The receiver yields each
    /// message once and closes when the session is released.
    async fn subscribe(&self, channel: ChannelId) -> Result<mpsc::Receiver<Message>, SessionError>;
}
