//! Batch orchestration.
//!
//! A request enters [`BatchRunner::run`], is validated against the current
//! registry snapshot, expanded into an ordered target plan, and driven one
//! target at a time: retry executor, throttle, result row, progress update.
//! Per-target failures never abort the batch; only request-level problems
//! and cancellation surface as errors.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchRunner`] | Drives one request to a finalized [`BatchReport`] |
//! | [`BatchRunnerBuilder`] | Wiring plus retry/throttle/progress tuning |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::directory::{Directory, DirectoryError};
use crate::error::ErrorContext;
use crate::progress::{get_progress_sink, ProgressReporter, ProgressSink};
use crate::registry::{Registry, RegistrySnapshot};
use crate::report::{BatchReport, OperationResult, Outcome, ReportBuilder};
use crate::resilience::{sleep_or_cancel, RetryExecutor, RetryPolicy, Throttler, Verdict};
use crate::types::{ActionDescriptor, ActionKind, GroupName, OperationRequest, Subject, TargetScope};
use crate::{Error, Result};

mod resolve;

use resolve::{plan_remove_targets, plan_subject_targets, PlanStep, PlannedTarget};

/// Environment override for the generic retry budget.
pub const ENV_MAX_RETRIES: &str = "WARDEN_MAX_RETRIES";
/// Environment override for the backoff base delay, in milliseconds.
pub const ENV_RETRY_BASE_MS: &str = "WARDEN_RETRY_BASE_MS";
/// Environment override for the inter-action throttle, in milliseconds.
pub const ENV_THROTTLE_MS: &str = "WARDEN_THROTTLE_MS";

/// Builder for [`BatchRunner`].
///
/// Keep this surface small: a directory, a registry, and the three tuning
/// knobs requests care about.
pub struct BatchRunnerBuilder {
    directory: Option<Arc<dyn Directory>>,
    registry: Option<Arc<Registry>>,
    policy: RetryPolicy,
    throttle_interval: Duration,
    progress: Option<Arc<dyn ProgressSink>>,
    progress_every: usize,
    countdown_tick: Duration,
}

impl BatchRunnerBuilder {
    /// Start from defaults, honoring environment overrides:
    /// - `WARDEN_MAX_RETRIES` (default 3)
    /// - `WARDEN_RETRY_BASE_MS` (default 1000)
    /// - `WARDEN_THROTTLE_MS` (default 2000)
    pub fn new() -> Self {
        let mut policy = RetryPolicy::new();
        if let Some(max_retries) = std::env::var(ENV_MAX_RETRIES)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        {
            policy = policy.with_max_retries(max_retries);
        }
        if let Some(base_ms) = std::env::var(ENV_RETRY_BASE_MS)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            policy = policy.with_base_delay(Duration::from_millis(base_ms));
        }
        let throttle_interval = std::env::var(ENV_THROTTLE_MS)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Throttler::DEFAULT_INTERVAL);

        Self {
            directory: None,
            registry: None,
            policy,
            throttle_interval,
            progress: None,
            progress_every: ProgressReporter::DEFAULT_EVERY,
            countdown_tick: BatchRunner::DEFAULT_COUNTDOWN_TICK,
        }
    }

    /// Set the directory/action service implementation. Required.
    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Set the channel-group registry. Required.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the retry policy applied per action.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the inter-action throttle interval.
    pub fn with_throttle_interval(mut self, interval: Duration) -> Self {
        self.throttle_interval = interval;
        self
    }

    /// Inject a progress sink. Defaults to the globally configured sink.
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Override the progress cadence; values below 1 are clamped to 1.
    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every.max(1);
        self
    }

    /// Interval behind one countdown minute of a delayed start. Shorten it
    /// to keep delayed-start tests fast.
    pub fn with_countdown_tick(mut self, tick: Duration) -> Self {
        self.countdown_tick = tick;
        self
    }

    pub fn build(self) -> Result<BatchRunner> {
        let directory = self.directory.ok_or_else(|| {
            Error::configuration_with_context(
                "a directory implementation is required",
                ErrorContext::new()
                    .with_field_path("runner.directory")
                    .with_source("runner_builder"),
            )
        })?;
        let registry = self.registry.ok_or_else(|| {
            Error::configuration_with_context(
                "a registry is required",
                ErrorContext::new()
                    .with_field_path("runner.registry")
                    .with_source("runner_builder"),
            )
        })?;

        Ok(BatchRunner {
            directory,
            registry,
            executor: RetryExecutor::new(self.policy),
            throttler: Throttler::new(self.throttle_interval),
            progress: self.progress.unwrap_or_else(get_progress_sink),
            progress_every: self.progress_every,
            countdown_tick: self.countdown_tick,
        })
    }
}

impl Default for BatchRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequential batch executor.
///
/// One runner drives one request at a time; the single-worker discipline is
/// what keeps the external service's rate limits tractable.
pub struct BatchRunner {
    directory: Arc<dyn Directory>,
    registry: Arc<Registry>,
    executor: RetryExecutor,
    throttler: Throttler,
    progress: Arc<dyn ProgressSink>,
    progress_every: usize,
    countdown_tick: Duration,
}

impl BatchRunner {
    /// One countdown minute of a delayed start.
    pub const DEFAULT_COUNTDOWN_TICK: Duration = Duration::from_secs(60);
    /// Visible countdown window: at most this many per-minute updates before
    /// the remainder of the delay passes silently.
    pub const COUNTDOWN_VISIBLE_MINUTES: u64 = 5;

    pub fn builder() -> BatchRunnerBuilder {
        BatchRunnerBuilder::new()
    }

    /// Run `request` to completion and return the finalized report.
    pub async fn run(&self, request: &OperationRequest) -> Result<BatchReport> {
        self.run_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Run `request`, aborting with [`Error::Cancelled`] as soon as `cancel`
    /// fires at any wait or between targets. A cancelled batch returns no
    /// partial report.
    pub async fn run_with_cancellation(
        &self,
        request: &OperationRequest,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let snapshot = self.registry.snapshot();
        validate_request(&snapshot, request)?;

        let subject = match request.kind {
            ActionKind::Remove => None,
            ActionKind::Restrict | ActionKind::Lift => {
                let subject = request
                    .subject
                    .as_ref()
                    .ok_or_else(|| missing_subject(request.kind))?;
                Some(self.resolve_subject(subject).await?)
            }
        };

        let mut builder = ReportBuilder::new(request.kind, subject.clone());
        let mut reporter =
            ProgressReporter::new(self.progress.clone()).with_every(self.progress_every);
        info!(
            batch = builder.batch_id(),
            kind = %request.kind,
            delay_minutes = request.delay_minutes,
            "batch accepted"
        );

        self.delayed_start(&reporter, request.delay_minutes, cancel)
            .await?;

        let plan = match (request.kind, &subject) {
            (ActionKind::Remove, _) => {
                plan_remove_targets(self.directory.as_ref(), &snapshot, &request.scope, cancel)
                    .await?
            }
            (_, Some(subject)) => {
                plan_subject_targets(
                    self.directory.as_ref(),
                    &snapshot,
                    &request.scope,
                    subject,
                    cancel,
                )
                .await?
            }
            (kind, None) => return Err(missing_subject(kind)),
        };

        let total = plan.len();
        debug!(batch = builder.batch_id(), targets = total, "target plan resolved");

        for target in plan {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let PlannedTarget {
                group,
                channel,
                member,
                step,
            } = target;

            let attempted = matches!(&step, PlanStep::Apply(_));
            let outcome = match step {
                PlanStep::Apply(target_subject) => {
                    let action = ActionDescriptor::for_kind(request.kind, channel.id, target_subject);
                    let driven = self
                        .executor
                        .execute(self.directory.as_ref(), &action, cancel)
                        .await?;
                    match driven.verdict {
                        Verdict::Succeeded => Outcome::Succeeded,
                        Verdict::Failed(reason) => Outcome::Failed(reason),
                    }
                }
                PlanStep::Skip(reason) => Outcome::Skipped(reason),
                PlanStep::Fail(reason) => Outcome::Failed(reason),
            };

            builder.record(OperationResult {
                group,
                channel,
                member,
                outcome,
            });
            // Only attempted actions are spaced; plan-level rows never
            // reached the service.
            if attempted {
                self.throttler.wait(cancel).await?;
            }
            reporter
                .report(builder.recorded(), total, builder.succeeded())
                .await;
        }

        let report = builder.finalize();
        info!(
            batch = report.batch_id.as_str(),
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "batch complete"
        );
        Ok(report)
    }

    /// Resolve the batch subject up front so a bad identity fails the request
    /// before any waiting or fan-out happens.
    async fn resolve_subject(&self, subject: &Subject) -> Result<Subject> {
        match self.directory.resolve(subject.id.0).await {
            Ok(entity) => {
                let mut resolved = subject.clone();
                if resolved.handle.is_none() {
                    if let Some(name) = entity.display_name {
                        resolved = resolved.with_handle(name);
                    }
                }
                Ok(resolved)
            }
            Err(error @ DirectoryError::NotFound { .. }) => Err(Error::validation_with_context(
                "subject did not resolve",
                ErrorContext::new()
                    .with_field_path("request.subject")
                    .with_details(error.to_string())
                    .with_source("request_validator"),
            )),
            Err(error) => Err(Error::Directory(error)),
        }
    }

    /// Staged delayed start: one countdown update per elapsed minute for the
    /// first five minutes, then the rest of the delay in a single silent wait.
    async fn delayed_start(
        &self,
        reporter: &ProgressReporter,
        delay_minutes: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if delay_minutes == 0 {
            return Ok(());
        }
        info!(delay_minutes, "delaying batch start");

        let visible = delay_minutes.min(Self::COUNTDOWN_VISIBLE_MINUTES);
        for elapsed in 0..visible {
            sleep_or_cancel(self.countdown_tick, cancel).await?;
            reporter.countdown(delay_minutes - (elapsed + 1)).await;
        }

        let silent_minutes = delay_minutes - visible;
        if silent_minutes > 0 {
            let factor = u32::try_from(silent_minutes).unwrap_or(u32::MAX);
            sleep_or_cancel(self.countdown_tick.saturating_mul(factor), cancel).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRunner")
            .field("throttler", &self.throttler)
            .field("progress_every", &self.progress_every)
            .field("countdown_tick", &self.countdown_tick)
            .finish_non_exhaustive()
    }
}

fn missing_subject(kind: ActionKind) -> Error {
    Error::validation_with_context(
        format!("{} requires a subject", kind),
        ErrorContext::new()
            .with_field_path("request.subject")
            .with_source("request_validator"),
    )
}

/// Request-level validation against the snapshot the batch will run under.
fn validate_request(snapshot: &RegistrySnapshot, request: &OperationRequest) -> Result<()> {
    if let Some(issuer) = request.issued_by {
        if !snapshot.is_admin(issuer) {
            return Err(Error::validation_with_context(
                "issuer is not an administrator",
                ErrorContext::new()
                    .with_field_path("request.issued_by")
                    .with_details(issuer.to_string())
                    .with_source("request_validator"),
            ));
        }
    }

    match request.kind {
        ActionKind::Restrict | ActionKind::Lift => {
            if request.subject.is_none() {
                return Err(missing_subject(request.kind));
            }
        }
        ActionKind::Remove => {
            if request.subject.is_some() {
                return Err(Error::validation_with_context(
                    "remove sweeps take their targets from channel membership",
                    ErrorContext::new()
                        .with_field_path("request.subject")
                        .with_source("request_validator"),
                ));
            }
        }
    }

    if request.delay_minutes > 0 && request.kind != ActionKind::Restrict {
        return Err(Error::validation_with_context(
            "delayed start is only valid for restrict",
            ErrorContext::new()
                .with_field_path("request.delay_minutes")
                .with_details(request.delay_minutes.to_string())
                .with_source("request_validator"),
        ));
    }

    match &request.scope {
        TargetScope::Groups(names) => {
            if names.is_empty() {
                return Err(Error::validation_with_context(
                    "scope names no groups",
                    ErrorContext::new()
                        .with_field_path("request.scope")
                        .with_source("request_validator"),
                ));
            }
            for name in names {
                if snapshot.group(name).is_none() {
                    let available: Vec<&str> =
                        snapshot.group_names().map(GroupName::as_str).collect();
                    return Err(Error::validation_with_context(
                        "unknown group",
                        ErrorContext::new()
                            .with_field_path(format!("request.scope.{}", name))
                            .with_details(format!("available groups: {}", available.join(", ")))
                            .with_source("request_validator"),
                    ));
                }
            }
        }
        TargetScope::AllGroups => {}
        TargetScope::Channels(channels) => {
            if channels.is_empty() {
                return Err(Error::validation_with_context(
                    "scope names no channels",
                    ErrorContext::new()
                        .with_field_path("request.scope")
                        .with_source("request_validator"),
                ));
            }
        }
    }

    Ok(())
}
