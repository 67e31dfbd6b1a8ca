//! Error taxonomy.
//!
//! Only [`StartupError`] ever reaches `main`. Every other error is contained
//! by the component that sees it: submissions are retried, retrieval failures
//! truncate the backlog pass, session errors are logged.

use std::path::PathBuf;

use thiserror::Error;

/// The target channel could not be identified. Fatal to startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("channel {0:?} is neither an @handle nor a numeric id")]
    Malformed(String),
    #[error("channel {handle} not found: {reason}")]
    NotFound { handle: String, reason: String },
    #[error("transport error while resolving channel: {0}")]
    Transport(String),
}

/// A single reaction could not be sent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("reaction rejected: {0}")]
    Rejected(String),
    #[error("transport error while sending reaction: {0}")]
    Transport(String),
}

/// The backlog could not be fetched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("history rejected: {0}")]
    Rejected(String),
    #[error("transport error while fetching history: {0}")]
    Transport(String),
}

/// Opening, releasing, or subscribing with a session failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {session} failed to open: {reason}")]
    Open { session: String, reason: String },
    #[error("session {session} failed to close: {reason}")]
    Close { session: String, reason: String },
    #[error("session {session} failed to subscribe: {reason}")]
    Subscribe { session: String, reason: String },
}

/// Conditions that stop the process before it reaches the backlog phase.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("no usable account session")]
    NoSessions,
}

/// Invalid or unreadable settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("reactions must contain at least one symbol")]
    EmptyReactions,
    #[error("pacing window {name} is invalid: [{low}, {high}]")]
    InvalidWindow { name: &'static str, low: f64, high: f64 },
    #[error("pacing value {0} is out of range")]
    OutOfRange(&'static str),
}
