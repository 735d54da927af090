use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use super::identity::{ChannelId, SubjectId};

/// The kind of moderation action a batch applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Ban: revoke the subject's access to the channel.
    Restrict,
    /// Unban: clear every revoked right.
    Lift,
    /// Kick: sweep non-exempt members out of the channel.
    Remove,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Restrict => "restrict",
            ActionKind::Lift => "lift",
            ActionKind::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// Set of revoked rights sent with a restriction call.
///
/// Every flag means "this right is revoked"; an all-false mask clears all
/// restrictions on the subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightsMask {
    pub view_messages: bool,
    pub send_messages: bool,
    pub send_media: bool,
    pub embed_links: bool,
    pub invite_users: bool,
}

impl RightsMask {
    /// The mask a ban (and a kick) sends: viewing revoked, which removes the
    /// subject from the channel.
    pub fn banned() -> Self {
        Self {
            view_messages: true,
            ..Self::default()
        }
    }

    /// The mask an unban sends: nothing revoked.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn is_unrestricted(&self) -> bool {
        *self == Self::default()
    }
}

/// Immutable description of one action against one channel.
///
/// Built by the batch runner once per resolved target and handed to the
/// retry executor; carries everything the directory call needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub kind: ActionKind,
    pub channel: ChannelId,
    pub subject: SubjectId,
    pub rights: RightsMask,
    pub until: Option<SystemTime>,
}

impl ActionDescriptor {
    pub fn restrict(channel: ChannelId, subject: SubjectId) -> Self {
        Self {
            kind: ActionKind::Restrict,
            channel,
            subject,
            rights: RightsMask::banned(),
            until: None,
        }
    }

    pub fn lift(channel: ChannelId, subject: SubjectId) -> Self {
        Self {
            kind: ActionKind::Lift,
            channel,
            subject,
            rights: RightsMask::unrestricted(),
            until: None,
        }
    }

    pub fn remove(channel: ChannelId, subject: SubjectId) -> Self {
        Self {
            kind: ActionKind::Remove,
            channel,
            subject,
            rights: RightsMask::banned(),
            until: None,
        }
    }

    /// Descriptor for `kind` with the rights mask that kind implies.
    pub fn for_kind(kind: ActionKind, channel: ChannelId, subject: SubjectId) -> Self {
        match kind {
            ActionKind::Restrict => Self::restrict(channel, subject),
            ActionKind::Lift => Self::lift(channel, subject),
            ActionKind::Remove => Self::remove(channel, subject),
        }
    }

    /// Expire the restriction at `until` instead of applying it indefinitely.
    pub fn with_until(mut self, until: SystemTime) -> Self {
        self.until = Some(until);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banned_mask_revokes_viewing_only() {
        let mask = RightsMask::banned();
        assert!(mask.view_messages);
        assert!(!mask.send_messages);
        assert!(!mask.is_unrestricted());
    }

    #[test]
    fn test_unrestricted_mask_is_empty() {
        assert!(RightsMask::unrestricted().is_unrestricted());
    }

    #[test]
    fn test_descriptor_rights_follow_kind() {
        let channel = ChannelId(-100);
        let subject = SubjectId(7);

        let restrict = ActionDescriptor::for_kind(ActionKind::Restrict, channel, subject);
        assert_eq!(restrict.rights, RightsMask::banned());
        assert_eq!(restrict.until, None);

        let lift = ActionDescriptor::for_kind(ActionKind::Lift, channel, subject);
        assert!(lift.rights.is_unrestricted());

        let remove = ActionDescriptor::for_kind(ActionKind::Remove, channel, subject);
        assert_eq!(remove.rights, RightsMask::banned());
    }
}
