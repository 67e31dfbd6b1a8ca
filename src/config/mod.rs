//! Run settings, loaded from a JSON file.
//!
//! ```json
//! {
//!   "channel": "@mychannel",
//!   "reactions": ["👍", "🔥", "❤️"],
//!   "backlog_limit": 100,
//!   "pacing": { "live_jitter": [1, 3] },
//!   "telegram": { "poll_timeout_secs": 30 }
//! }
//! ```
//!
//! Only `channel` and `reactions` are required. Unknown keys are ignored.

use serde::Deserialize;
use std::path::Path;

use crate::client::ChannelRef;
use crate::client::telegram::TelegramConfig;
use crate::consts::DEFAULT_BACKLOG_LIMIT;
use crate::engine::chorus::EngineConfig;
use crate::engine::pacing::{Pacing, Vocabulary};
use crate::error::ConfigError;

fn default_backlog_limit() -> usize {
    DEFAULT_BACKLOG_LIMIT
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub channel: ChannelRef,
    pub reactions: Vec<String>,
    #[serde(default = "default_backlog_limit")]
    pub backlog_limit: usize,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Settings {
    /// Read and validate the settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Vocabulary::new(self.reactions.iter().cloned())?;
        self.pacing.validate()
    }

    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        Ok(EngineConfig {
            channel: self.channel.clone(),
            vocabulary: Vocabulary::new(self.reactions.iter().cloned())?,
            backlog_limit: self.backlog_limit,
            pacing: self.pacing.clone(),
        })
    }
}
