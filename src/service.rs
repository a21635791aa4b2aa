use crate::coordinator::Coordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Drives the coordinator on the polling cadence. Retry-on-failure is simply
/// the next timer tick; missed ticks are skipped rather than bursted.
pub struct PollService {
    coordinator: Arc<Coordinator>,
    interval: Duration,
}

impl PollService {
    pub fn new(coordinator: Arc<Coordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
        }
    }

    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.run_once().await,
                }
            }
        })
    }

    async fn run_once(&self) {
        match self.coordinator.try_poll().await {
            None => tracing::debug!("poll already in flight, skipping tick"),
            Some(Err(err)) => tracing::warn!(error = %err, "forecast poll failed"),
            Some(Ok(outcome)) => tracing::debug!(?outcome, "forecast poll finished"),
        }
    }
}
