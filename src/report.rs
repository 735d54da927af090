//! Per-target outcomes and batch report aggregation.
//!
//! The [`ReportBuilder`] collects one [`OperationResult`] per resolved target
//! in resolution order; [`BatchReport`] is the immutable, finalized view with
//! totals and a plain-text rendering for status messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::types::{ActionKind, ChannelRef, GroupName, Subject};

/// Terminal failure classification for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    /// The acting account lacks the rights to act on the channel.
    PermissionDenied,
    /// The subject was not a member of the channel.
    NotParticipant,
    /// The generic retry budget ran out.
    RetryBudgetExhausted { attempts: u32, last_error: String },
    /// The opt-in cumulative rate-limit wait ceiling was hit.
    RateLimitBudgetExhausted { waited_secs: u64 },
    /// The channel itself could not be resolved or enumerated.
    ChannelUnavailable { message: String },
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::PermissionDenied => f.write_str("missing admin rights on the channel"),
            FailReason::NotParticipant => f.write_str("subject is not in the channel"),
            FailReason::RetryBudgetExhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {} attempts: {}", attempts, last_error),
            FailReason::RateLimitBudgetExhausted { waited_secs } => {
                write!(f, "rate-limit wait budget exhausted after {}s", waited_secs)
            }
            FailReason::ChannelUnavailable { message } => {
                write!(f, "channel unavailable: {}", message)
            }
        }
    }
}

/// Why a target was skipped without ever being attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Pre-validation could not resolve the identity.
    Unresolved { detail: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unresolved { detail } => f.write_str(detail),
        }
    }
}

/// Terminal outcome of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed(FailReason),
    Skipped(SkipReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }
}

/// One per-target result row. Exactly one exists per resolved target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Group the target came from; `None` for explicit channel scopes.
    pub group: Option<GroupName>,
    pub channel: ChannelRef,
    /// The swept member, for `Remove` rows. `Restrict`/`Lift` rows act on the
    /// batch subject and leave this empty.
    pub member: Option<Subject>,
    pub outcome: Outcome,
}

impl OperationResult {
    /// Label used in report lines: channel title plus the member, if any.
    pub fn label(&self) -> String {
        match &self.member {
            Some(member) => format!("{} / {}", self.channel.label(), member),
            None => self.channel.label(),
        }
    }
}

/// Incremental result aggregator. Rows append in resolution order and are
/// never re-sorted; `finalize` consumes the builder so a report cannot grow
/// after completion.
pub struct ReportBuilder {
    batch_id: String,
    action: ActionKind,
    subject: Option<Subject>,
    results: Vec<OperationResult>,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    started: Instant,
}

impl ReportBuilder {
    pub fn new(action: ActionKind, subject: Option<Subject>) -> Self {
        Self {
            batch_id: Uuid::new_v4().to_string(),
            action,
            subject,
            results: Vec::new(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            started: Instant::now(),
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Append one row and update the running totals.
    pub fn record(&mut self, result: OperationResult) {
        match result.outcome {
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::Failed(_) => self.failed += 1,
            Outcome::Skipped(_) => self.skipped += 1,
        }
        self.results.push(result);
    }

    /// Rows recorded so far.
    pub fn recorded(&self) -> usize {
        self.results.len()
    }

    /// Running success count, for progress updates.
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn finalize(self) -> BatchReport {
        BatchReport {
            batch_id: self.batch_id,
            action: self.action,
            subject: self.subject,
            results: self.results,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Finalized report for one completed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub action: ActionKind,
    pub subject: Option<Subject>,
    pub results: Vec<OperationResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    /// Number of resolved targets; always equals `results.len()`.
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.succeeded as f64 / self.results.len() as f64
        }
    }

    /// Plain-text rendering for a status message: rows grouped under their
    /// group header in resolution order, then totals.
    pub fn summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.results.len() + 4);
        match &self.subject {
            Some(subject) => lines.push(format!("{} results for {}", self.action, subject)),
            None => lines.push(format!("{} results", self.action)),
        }

        let mut current_group: Option<&GroupName> = None;
        for result in &self.results {
            if let Some(group) = &result.group {
                if current_group != Some(group) {
                    lines.push(format!("[{}]", group));
                    current_group = Some(group);
                }
            }
            let line = match &result.outcome {
                Outcome::Succeeded => format!("  ok       {}", result.label()),
                Outcome::Failed(reason) => format!("  failed   {}: {}", result.label(), reason),
                Outcome::Skipped(reason) => format!("  skipped  {}: {}", result.label(), reason),
            };
            lines.push(line);
        }

        lines.push(format!(
            "totals: {} succeeded, {} failed, {} skipped ({} targets in {:.1}s)",
            self.succeeded,
            self.failed,
            self.skipped,
            self.total(),
            self.elapsed.as_secs_f64(),
        ));
        lines.join("\n")
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
