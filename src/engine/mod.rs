pub mod backlog;
pub mod chorus;
pub mod dispatch;
pub mod ledger;
pub mod pacing;
pub mod router;

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::StartupError;
use self::chorus::RunSummary;

/// The outermost boundary. main.rs only knows this trait.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run until `shutdown` fires. Errors only for conditions that prevent
    /// the run from starting.
    async fn run(&self, shutdown: CancellationToken) -> Result<RunSummary, StartupError>;
}

/// Sleep unless `shutdown` fires first. Returns false when interrupted.
pub(crate) async fn pause(duration: Duration, shutdown: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !shutdown.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pause_sleeps_full_duration() {
        let start = tokio::time::Instant::now();
        assert!(pause(Duration::from_secs(3), &CancellationToken::new()).await);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn pause_returns_early_on_shutdown() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move { trigger.cancel() });
        assert!(!pause(Duration::from_secs(3600), &token).await);
    }

    #[tokio::test]
    async fn zero_pause_reports_cancellation() {
        let token = CancellationToken::new();
        assert!(pause(Duration::ZERO, &token).await);
        token.cancel();
        assert!(!pause(Duration::ZERO, &token).await);
    }
}
