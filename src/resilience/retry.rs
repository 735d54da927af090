use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::directory::{Directory, DirectoryError};
use crate::report::FailReason;
use crate::types::ActionDescriptor;
use crate::Result;

use super::sleep_or_cancel;

/// Retry policy for a single action.
///
/// Two independent tracks: service-signaled rate-limit waits are honored for
/// exactly the signaled duration and repeat without limit (unless an explicit
/// [`rate_limit_budget`](Self::rate_limit_budget) is set); every other failure
/// backs off exponentially and consumes the generic attempt budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Generic attempts per action; the `max_retries`-th generic failure is
    /// terminal.
    pub max_retries: u32,
    /// Base delay for exponential backoff between generic attempts.
    pub base_delay: Duration,
    /// Optional ceiling on the cumulative rate-limit wait per action.
    /// `None` (the default) keeps the loop unbounded.
    pub rate_limit_budget: Option<Duration>,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            base_delay: Self::DEFAULT_BASE_DELAY,
            rate_limit_budget: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_rate_limit_budget(mut self, budget: Duration) -> Self {
        self.rate_limit_budget = Some(budget);
        self
    }

    /// Backoff before the next generic attempt: `base_delay * 2^attempt`,
    /// saturating instead of overflowing.
    pub(crate) fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal verdict for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Succeeded,
    Failed(FailReason),
}

/// What happened while driving one action to its verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub verdict: Verdict,
    /// Directory calls made, counting rate-limited ones and the final call.
    pub attempts: u32,
    /// Rate-limit waits honored.
    pub rate_limit_waits: u32,
    /// Cumulative time spent in rate-limit waits.
    pub rate_limit_wait_total: Duration,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.verdict, Verdict::Succeeded)
    }
}

/// Runs one action to completion under a [`RetryPolicy`].
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Drive `action` to a terminal verdict against `directory`.
    ///
    /// Rate-limit signals sleep for exactly the signaled seconds and do not
    /// consume the generic attempt budget. Permission and not-a-participant
    /// failures are terminal on the first occurrence. Everything else backs
    /// off exponentially until the budget runs out. Returns `Err` only when
    /// `cancel` fires during a wait or between attempts.
    pub async fn execute(
        &self,
        directory: &dyn Directory,
        action: &ActionDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ActionOutcome> {
        let mut attempts: u32 = 0;
        let mut generic_failures: u32 = 0;
        let mut rate_limit_waits: u32 = 0;
        let mut rate_limit_wait_total = Duration::ZERO;

        loop {
            if cancel.is_cancelled() {
                return Err(crate::Error::Cancelled);
            }

            attempts = attempts.saturating_add(1);
            let result = directory
                .apply_restriction(action.channel, action.subject, &action.rights, action.until)
                .await;

            match result {
                Ok(()) => {
                    debug!(
                        kind = %action.kind,
                        channel = action.channel.0,
                        subject = action.subject.0,
                        attempts,
                        "action applied"
                    );
                    return Ok(ActionOutcome {
                        verdict: Verdict::Succeeded,
                        attempts,
                        rate_limit_waits,
                        rate_limit_wait_total,
                    });
                }
                Err(DirectoryError::RateLimited { retry_after_secs }) => {
                    let wait = Duration::from_secs(retry_after_secs);
                    if let Some(budget) = self.policy.rate_limit_budget {
                        if rate_limit_wait_total + wait > budget {
                            warn!(
                                channel = action.channel.0,
                                subject = action.subject.0,
                                waited_secs = rate_limit_wait_total.as_secs(),
                                "rate-limit wait budget exhausted"
                            );
                            return Ok(ActionOutcome {
                                verdict: Verdict::Failed(FailReason::RateLimitBudgetExhausted {
                                    waited_secs: rate_limit_wait_total.as_secs(),
                                }),
                                attempts,
                                rate_limit_waits,
                                rate_limit_wait_total,
                            });
                        }
                    }
                    warn!(
                        channel = action.channel.0,
                        subject = action.subject.0,
                        wait_secs = retry_after_secs,
                        "rate limited, honoring signaled wait"
                    );
                    rate_limit_waits = rate_limit_waits.saturating_add(1);
                    rate_limit_wait_total += wait;
                    sleep_or_cancel(wait, cancel).await?;
                }
                Err(DirectoryError::PermissionDenied) => {
                    warn!(
                        channel = action.channel.0,
                        subject = action.subject.0,
                        "permission denied, not retrying"
                    );
                    return Ok(ActionOutcome {
                        verdict: Verdict::Failed(FailReason::PermissionDenied),
                        attempts,
                        rate_limit_waits,
                        rate_limit_wait_total,
                    });
                }
                Err(DirectoryError::NotParticipant) => {
                    debug!(
                        channel = action.channel.0,
                        subject = action.subject.0,
                        "subject not in channel"
                    );
                    return Ok(ActionOutcome {
                        verdict: Verdict::Failed(FailReason::NotParticipant),
                        attempts,
                        rate_limit_waits,
                        rate_limit_wait_total,
                    });
                }
                Err(error) => {
                    generic_failures += 1;
                    if generic_failures >= self.policy.max_retries {
                        warn!(
                            channel = action.channel.0,
                            subject = action.subject.0,
                            attempts = generic_failures,
                            %error,
                            "retry budget exhausted"
                        );
                        return Ok(ActionOutcome {
                            verdict: Verdict::Failed(FailReason::RetryBudgetExhausted {
                                attempts: generic_failures,
                                last_error: error.to_string(),
                            }),
                            attempts,
                            rate_limit_waits,
                            rate_limit_wait_total,
                        });
                    }
                    let delay = self.policy.backoff_delay(generic_failures - 1);
                    debug!(
                        channel = action.channel.0,
                        subject = action.subject.0,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "transient failure, backing off"
                    );
                    sleep_or_cancel(delay, cancel).await?;
                }
            }
        }
    }
}
