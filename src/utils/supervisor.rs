use crate::utils::config::RefreshConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bounded exponential backoff: initial delay doubling up to a ceiling
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn from_config(cfg: &RefreshConfig) -> Self {
        Self::new(
            Duration::from_millis(cfg.backoff_initial_ms),
            Duration::from_millis(cfg.backoff_max_ms),
        )
    }

    /// Delay to wait now; the following call waits twice as long
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

/// Run `task` every `period` until `shutdown` fires.
///
/// A failed run is logged and retried after a backoff delay instead of the
/// normal period; consecutive failures grow the delay up to the backoff
/// ceiling. `on_failure` is called once per failure. A successful run's value
/// is discarded. The loop never returns on its own.
pub async fn run_periodic<F, Fut, T, E, H>(
    name: &str,
    period: Duration,
    mut backoff: Backoff,
    shutdown: CancellationToken,
    mut task: F,
    mut on_failure: H,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    H: FnMut(&E),
{
    info!(task = name, period_ms = period.as_millis() as u64, "supervised task started");

    loop {
        let outcome = tokio::select! {
            _ = shutdown.cancelled() => break,
            r = task() => r,
        };

        let delay = match outcome {
            Ok(_) => {
                backoff.reset();
                period
            }
            Err(e) => {
                on_failure(&e);
                let delay = backoff.next_delay();
                warn!(task = name, error = %e, retry_in_ms = delay.as_millis() as u64, "supervised task failed");
                delay
            }
        };

        debug!(task = name, sleep_ms = delay.as_millis() as u64, "supervised task sleeping");
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!(task = name, "supervised task stopped");
}
