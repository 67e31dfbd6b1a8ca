//! Randomized timing and reaction choice.
//!
//! Every interval and every subset is drawn fresh so no two accounts (and no
//! two messages) show the same rhythm to the remote service.

use rand::RngExt;
use serde::Deserialize;
use std::time::Duration;

use crate::error::ConfigError;

/// Hard cap on reactions one session leaves on one message.
pub const MAX_REACTIONS: usize = 2;

/// Longest configurable wait, in seconds (one day).
pub const MAX_DELAY_SECS: f64 = 86_400.0;

/// A `[low, high]` interval in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Window(pub f64, pub f64);

impl Window {
    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        let Window(low, high) = *self;
        if !(0.0..=MAX_DELAY_SECS).contains(&low) || !(low..=MAX_DELAY_SECS).contains(&high) {
            return Err(ConfigError::InvalidWindow { name, low, high });
        }
        Ok(())
    }

    pub fn sample<R: RngExt>(&self, rng: &mut R) -> Duration {
        delay(self.0, self.1, rng)
    }
}

/// Uniform duration in `[low_secs, high_secs)`. A degenerate window yields `low_secs`.
pub fn delay<R: RngExt>(low_secs: f64, high_secs: f64, rng: &mut R) -> Duration {
    let low = low_secs.max(0.0);
    if high_secs <= low {
        return Duration::from_secs_f64(low);
    }
    Duration::from_secs_f64(rng.random_range(low..high_secs))
}

/// Between 1 and `min(max, symbols.len())` distinct symbols, in random order.
pub fn pick_reaction_subset<R: RngExt>(symbols: &[String], max: usize, rng: &mut R) -> Vec<String> {
    let cap = max.min(symbols.len());
    if cap == 0 {
        return Vec::new();
    }
    let count = rng.random_range(1..=cap);
    let mut pool: Vec<&String> = symbols.iter().collect();
    let mut picked = Vec::with_capacity(count);
    for _ in 0..count {
        let i = rng.random_range(0..pool.len());
        picked.push(pool.swap_remove(i).clone());
    }
    picked
}

/// The configured reaction symbols. Never empty, no duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary(Vec<String>);

impl Vocabulary {
    pub fn new<I, S>(symbols: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for symbol in symbols {
            let symbol = symbol.into().trim().to_string();
            if !symbol.is_empty() && !unique.contains(&symbol) {
                unique.push(symbol);
            }
        }
        if unique.is_empty() {
            return Err(ConfigError::EmptyReactions);
        }
        Ok(Self(unique))
    }

    pub fn symbols(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Timing and retry knobs. Overridable from the `pacing` settings section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Pacing {
    pub between_reactions: Window,
    pub between_sessions: Window,
    pub between_messages: Window,
    pub live_jitter: Window,
    /// Backoff before retry `n` is `retry_base_secs * n`.
    pub retry_base_secs: f64,
    /// Tries per session per message.
    pub max_attempts: u32,
    /// Upper bound on reactions per session per message, at most [`MAX_REACTIONS`].
    pub max_reactions: usize,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            between_reactions: Window(2.0, 4.0),
            between_sessions: Window(4.0, 7.0),
            between_messages: Window(5.0, 8.0),
            live_jitter: Window(1.0, 3.0),
            retry_base_secs: 5.0,
            max_attempts: 3,
            max_reactions: MAX_REACTIONS,
        }
    }
}

impl Pacing {
    /// No waiting at all. Retry and subset rules are unchanged.
    pub fn instant() -> Self {
        Self {
            between_reactions: Window(0.0, 0.0),
            between_sessions: Window(0.0, 0.0),
            between_messages: Window(0.0, 0.0),
            live_jitter: Window(0.0, 0.0),
            retry_base_secs: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.between_reactions.validate("between_reactions")?;
        self.between_sessions.validate("between_sessions")?;
        self.between_messages.validate("between_messages")?;
        self.live_jitter.validate("live_jitter")?;
        if !(0.0..=MAX_DELAY_SECS).contains(&self.retry_base_secs) {
            return Err(ConfigError::OutOfRange("retry_base_secs"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::OutOfRange("max_attempts"));
        }
        if !(1..=MAX_REACTIONS).contains(&self.max_reactions) {
            return Err(ConfigError::OutOfRange("max_reactions"));
        }
        Ok(())
    }

    pub fn pick_reactions(&self, vocabulary: &Vocabulary) -> Vec<String> {
        pick_reaction_subset(vocabulary.symbols(), self.max_reactions, &mut rand::rng())
    }

    pub fn reaction_gap(&self) -> Duration {
        self.between_reactions.sample(&mut rand::rng())
    }

    pub fn session_gap(&self) -> Duration {
        self.between_sessions.sample(&mut rand::rng())
    }

    pub fn message_gap(&self) -> Duration {
        self.between_messages.sample(&mut rand::rng())
    }

    pub fn jitter(&self) -> Duration {
        self.live_jitter.sample(&mut rand::rng())
    }

    /// Wait before retry number `retry` (1-based).
    pub fn retry_backoff(&self, retry: u32) -> Duration {
        Duration::from_secs_f64(self.retry_base_secs * f64::from(retry))
    }
}
