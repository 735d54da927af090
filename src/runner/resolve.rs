//! Target resolution: expands a request's scope into the ordered plan the
//! batch loop walks. Every planned target becomes exactly one report row.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::directory::{Directory, DirectoryError};
use crate::registry::RegistrySnapshot;
use crate::report::{FailReason, SkipReason};
use crate::types::{ChannelId, ChannelRef, Entity, GroupName, Subject, SubjectId, TargetScope};
use crate::{Error, Result};

/// One planned row.
pub(crate) struct PlannedTarget {
    pub group: Option<GroupName>,
    pub channel: ChannelRef,
    /// The swept member, for remove rows.
    pub member: Option<Subject>,
    pub step: PlanStep,
}

/// What the batch loop does with a planned target.
pub(crate) enum PlanStep {
    /// Drive the action against this subject through the retry executor.
    Apply(SubjectId),
    /// Record a skip without calling the service.
    Skip(SkipReason),
    /// Record a failure without calling the service.
    Fail(FailReason),
}

/// Channels in scope: request order for explicit lists and named groups,
/// registry order for the all-groups sweep.
pub(crate) fn scope_channels(
    snapshot: &RegistrySnapshot,
    scope: &TargetScope,
) -> Vec<(Option<GroupName>, ChannelId)> {
    match scope {
        TargetScope::Groups(names) => names
            .iter()
            .flat_map(|name| {
                snapshot
                    .group(name)
                    .unwrap_or_default()
                    .iter()
                    .map(move |channel| (Some(name.clone()), *channel))
            })
            .collect(),
        TargetScope::AllGroups => snapshot
            .groups
            .iter()
            .flat_map(|(name, channels)| {
                channels
                    .iter()
                    .map(move |channel| (Some(name.clone()), *channel))
            })
            .collect(),
        TargetScope::Channels(channels) => {
            channels.iter().map(|channel| (None, *channel)).collect()
        }
    }
}

/// Plan for restrict/lift: one apply per resolvable channel, acting on the
/// batch subject. Unknown channels become skips, other resolution failures
/// become failed rows.
pub(crate) async fn plan_subject_targets(
    directory: &dyn Directory,
    snapshot: &RegistrySnapshot,
    scope: &TargetScope,
    subject: &Subject,
    cancel: &CancellationToken,
) -> Result<Vec<PlannedTarget>> {
    let mut plan = Vec::new();
    for (group, channel_id) in scope_channels(snapshot, scope) {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match directory.resolve(channel_id.0).await {
            Ok(entity) => plan.push(PlannedTarget {
                group,
                channel: channel_ref(channel_id, entity),
                member: None,
                step: PlanStep::Apply(subject.id),
            }),
            Err(error @ DirectoryError::NotFound { .. }) => {
                debug!(channel = channel_id.0, %error, "channel did not resolve, skipping");
                plan.push(PlannedTarget {
                    group,
                    channel: ChannelRef::new(channel_id),
                    member: None,
                    step: PlanStep::Skip(SkipReason::Unresolved {
                        detail: error.to_string(),
                    }),
                });
            }
            Err(error) => {
                warn!(channel = channel_id.0, %error, "channel unavailable");
                plan.push(channel_failure(group, channel_id, &error));
            }
        }
    }
    Ok(plan)
}

/// Plan for a remove sweep: enumerate each channel's membership, drop exempt
/// subjects without a row, probe the rest and plan a kick per member that
/// still resolves. A channel that cannot be resolved or enumerated yields a
/// single failed row.
pub(crate) async fn plan_remove_targets(
    directory: &dyn Directory,
    snapshot: &RegistrySnapshot,
    scope: &TargetScope,
    cancel: &CancellationToken,
) -> Result<Vec<PlannedTarget>> {
    let mut plan = Vec::new();
    for (group, channel_id) in scope_channels(snapshot, scope) {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let channel = match directory.resolve(channel_id.0).await {
            Ok(entity) => channel_ref(channel_id, entity),
            Err(error) => {
                warn!(channel = channel_id.0, %error, "channel unavailable");
                plan.push(channel_failure(group, channel_id, &error));
                continue;
            }
        };
        let participants = match directory.list_participants(channel_id).await {
            Ok(participants) => participants,
            Err(error) => {
                warn!(channel = channel_id.0, %error, "membership listing failed");
                plan.push(channel_failure(group, channel_id, &error));
                continue;
            }
        };

        for participant in participants {
            if snapshot.is_exempt(participant.subject) {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            // Probe before planning the kick; stale membership records
            // surface here as resolution failures.
            match directory.resolve(participant.subject.0).await {
                Ok(entity) => {
                    let mut member = Subject::new(participant.subject);
                    if let Some(name) = entity.display_name {
                        member = member.with_handle(name);
                    }
                    plan.push(PlannedTarget {
                        group: group.clone(),
                        channel: channel.clone(),
                        member: Some(member),
                        step: PlanStep::Apply(participant.subject),
                    });
                }
                Err(error) => {
                    debug!(
                        channel = channel_id.0,
                        subject = participant.subject.0,
                        %error,
                        "member did not resolve, skipping"
                    );
                    plan.push(PlannedTarget {
                        group: group.clone(),
                        channel: channel.clone(),
                        member: Some(Subject::new(participant.subject)),
                        step: PlanStep::Skip(SkipReason::Unresolved {
                            detail: error.to_string(),
                        }),
                    });
                }
            }
        }
    }
    Ok(plan)
}

fn channel_ref(id: ChannelId, entity: Entity) -> ChannelRef {
    match entity.display_name {
        Some(title) => ChannelRef::new(id).with_title(title),
        None => ChannelRef::new(id),
    }
}

fn channel_failure(
    group: Option<GroupName>,
    channel: ChannelId,
    error: &DirectoryError,
) -> PlannedTarget {
    PlannedTarget {
        group,
        channel: ChannelRef::new(channel),
        member: None,
        step: PlanStep::Fail(FailReason::ChannelUnavailable {
            message: error.to_string(),
        }),
    }
}
