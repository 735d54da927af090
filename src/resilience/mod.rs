//! Resilience primitives for the action loop.
//!
//! Every external action runs under a [`RetryExecutor`], and consecutive
//! actions are spaced by a [`Throttler`]. Retry waits answer the service's
//! own signals; the throttle keeps the steady-state call rate under the
//! service's abuse thresholds.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`retry`] | Bounded-retry, unbounded-rate-limit-wait execution |
//! | [`throttle`] | Fixed minimum delay between consecutive actions |

pub mod retry;
pub mod throttle;

pub use retry::{ActionOutcome, RetryExecutor, RetryPolicy, Verdict};
pub use throttle::Throttler;

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Sleep that loses to cancellation.
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
