use super::AnalyticsAccumulator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Background task saving the accumulator on a fixed interval.
pub struct PeriodicFlush {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicFlush {
    pub fn spawn(accumulator: Arc<AnalyticsAccumulator>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match accumulator.save().await {
                            Ok(()) => tracing::debug!("Analytics flushed"),
                            Err(e) => tracing::warn!(error = %e, "Periodic analytics flush failed"),
                        }
                    }
                }
            }

            tracing::debug!("Periodic analytics flush stopped");
        });

        Self { cancel, handle }
    }

    /// Cancel the timer and wait for an in-flight save to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Periodic analytics flush task failed");
        }
    }
}
