use serde::{Deserialize, Serialize};

use super::action::ActionKind;
use super::identity::{ChannelId, GroupName, Subject, SubjectId};

/// Which targets a request fans out over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetScope {
    /// The named groups, in request order, each flattened in stored order.
    Groups(Vec<GroupName>),
    /// Every registered group, in registry order.
    AllGroups,
    /// An explicit channel list, bypassing the group registry.
    Channels(Vec<ChannelId>),
}

impl TargetScope {
    /// Scope over a single named group.
    pub fn group(name: impl Into<GroupName>) -> Self {
        TargetScope::Groups(vec![name.into()])
    }
}

/// One submitted moderation request. Immutable once built: the runner never
/// mutates it and reports against the values captured here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub kind: ActionKind,
    /// The subject acted on. Required for `Restrict`/`Lift`; must be absent
    /// for `Remove`, whose targets come from live channel membership.
    pub subject: Option<Subject>,
    pub scope: TargetScope,
    /// Staged delayed start, in minutes. Only valid for `Restrict`.
    pub delay_minutes: u64,
    /// The administrator who issued the request, when the hosting layer
    /// wants the runner to enforce that check itself.
    pub issued_by: Option<SubjectId>,
}

impl OperationRequest {
    pub fn restrict(subject: Subject, scope: TargetScope) -> Self {
        Self {
            kind: ActionKind::Restrict,
            subject: Some(subject),
            scope,
            delay_minutes: 0,
            issued_by: None,
        }
    }

    pub fn lift(subject: Subject, scope: TargetScope) -> Self {
        Self {
            kind: ActionKind::Lift,
            subject: Some(subject),
            scope,
            delay_minutes: 0,
            issued_by: None,
        }
    }

    pub fn remove(scope: TargetScope) -> Self {
        Self {
            kind: ActionKind::Remove,
            subject: None,
            scope,
            delay_minutes: 0,
            issued_by: None,
        }
    }

    pub fn with_delay_minutes(mut self, minutes: u64) -> Self {
        self.delay_minutes = minutes;
        self
    }

    pub fn with_issuer(mut self, issuer: SubjectId) -> Self {
        self.issued_by = Some(issuer);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubjectId;

    #[test]
    fn test_restrict_request_defaults() {
        let request = OperationRequest::restrict(
            Subject::new(SubjectId(1)),
            TargetScope::group("vip"),
        );
        assert_eq!(request.kind, ActionKind::Restrict);
        assert_eq!(request.delay_minutes, 0);
        assert!(request.issued_by.is_none());
    }

    #[test]
    fn test_remove_request_has_no_subject() {
        let request = OperationRequest::remove(TargetScope::AllGroups);
        assert!(request.subject.is_none());
    }

    #[test]
    fn test_group_scope_folds_case() {
        let scope = TargetScope::group("VIP");
        assert_eq!(scope, TargetScope::Groups(vec![GroupName::new("vip")]));
    }
}
