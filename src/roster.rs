//! Channel membership inspection.
//!
//! Read-only glue over the [`Directory`]: a membership snapshot per channel
//! with service bots filtered out, plus a resolution probe for checking that
//! a channel is reachable before registering it.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::debug;

use crate::directory::Directory;
use crate::types::{ChannelId, ChannelRef, Subject};
use crate::Result;

/// One listed member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub subject: Subject,
    pub joined_at: Option<SystemTime>,
}

/// Membership snapshot of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRoster {
    pub channel: ChannelRef,
    /// Size of the listed membership page, bots and unresolvable records
    /// included.
    pub total_participants: usize,
    /// Resolvable non-bot members, in listing order.
    pub members: Vec<RosterEntry>,
}

/// Fetch the channel's membership snapshot.
///
/// Members that no longer resolve are dropped from the roster (they still
/// count toward `total_participants`), as are service bot accounts.
pub async fn channel_roster(
    directory: &dyn Directory,
    channel: ChannelId,
) -> Result<ChannelRoster> {
    let channel = probe_channel(directory, channel).await?;
    let participants = directory.list_participants(channel.id).await?;
    let total_participants = participants.len();

    let mut members = Vec::with_capacity(total_participants);
    for participant in participants {
        match directory.resolve(participant.subject.0).await {
            Ok(entity) => {
                if entity.is_bot {
                    continue;
                }
                let mut subject = Subject::new(participant.subject);
                if let Some(name) = entity.display_name {
                    subject = subject.with_handle(name);
                }
                members.push(RosterEntry {
                    subject,
                    joined_at: participant.joined_at,
                });
            }
            Err(error) => {
                debug!(
                    channel = channel.id.0,
                    subject = participant.subject.0,
                    %error,
                    "member did not resolve, dropped from roster"
                );
            }
        }
    }

    Ok(ChannelRoster {
        channel,
        total_participants,
        members,
    })
}

/// Resolve `channel` and return its reference, or the directory's error when
/// the service cannot see it.
pub async fn probe_channel(directory: &dyn Directory, channel: ChannelId) -> Result<ChannelRef> {
    let entity = directory.resolve(channel.0).await?;
    let mut resolved = ChannelRef::new(channel);
    if let Some(title) = entity.display_name {
        resolved = resolved.with_title(title);
    }
    Ok(resolved)
}
