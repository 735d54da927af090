use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::Result;

use super::sleep_or_cancel;

/// Fixed minimum delay between consecutive actions.
///
/// Runs after every attempted action regardless of its outcome; it is not
/// adaptive and is independent of any rate-limit wait the retry executor
/// already honored for the same target.
#[derive(Debug, Clone)]
pub struct Throttler {
    interval: Duration,
}

impl Throttler {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep the fixed interval, or bail out when `cancel` fires.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        sleep_or_cancel(self.interval, cancel).await
    }
}

impl Default for Throttler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_default_interval() {
        assert_eq!(Throttler::default().interval(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_wait_lasts_at_least_the_interval() {
        let throttler = Throttler::new(Duration::from_millis(20));
        let started = Instant::now();
        throttler.wait(&CancellationToken::new()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_the_wait() {
        let throttler = Throttler::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                cancel.cancel();
            })
        };

        let started = Instant::now();
        let err = throttler.wait(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(60));
        handle.await.unwrap();
    }
}
