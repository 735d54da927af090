//! Directory/action service abstraction.
//!
//! The orchestrator never talks to the external service directly; everything
//! goes through the [`Directory`] trait so hosting layers can plug in their
//! transport and tests can script responses.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Directory`] | Resolution, membership listing and restriction calls |
//! | [`DirectoryError`] | Wire-level failure signals |
//! | [`InMemoryDirectory`] | Scripted in-memory implementation for tests |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use thiserror::Error;

use crate::types::{ChannelId, Entity, EntityId, Participant, RightsMask, SubjectId};

pub mod memory;

pub use memory::{AppliedAction, InMemoryDirectory};

/// Failure signals the directory/action service can report for one call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DirectoryError {
    /// Service-signaled rate limit: retry after exactly this many seconds.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The acting account lacks the rights to perform the call.
    #[error("missing admin rights on the channel")]
    PermissionDenied,

    /// The subject is not a member of the channel.
    #[error("subject is not in the channel")]
    NotParticipant,

    /// The identity does not resolve to anything.
    #[error("identity {id} did not resolve")]
    NotFound { id: EntityId },

    /// Anything else: network hiccups, internal service errors.
    #[error("directory unavailable: {message}")]
    Unavailable { message: String },
}

impl DirectoryError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        DirectoryError::Unavailable {
            message: message.into(),
        }
    }
}

/// The external directory/action service.
///
/// All three calls are rate limited by the service; callers are expected to
/// honor [`DirectoryError::RateLimited`] waits and to space action calls with
/// the [`Throttler`](crate::resilience::Throttler).
#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolve an identifier to a directory entity.
    async fn resolve(&self, id: EntityId) -> Result<Entity, DirectoryError>;

    /// List the channel's membership (one bounded page).
    async fn list_participants(
        &self,
        channel: ChannelId,
    ) -> Result<Vec<Participant>, DirectoryError>;

    /// Apply `rights` to `subject` on `channel`, optionally until `until`.
    async fn apply_restriction(
        &self,
        channel: ChannelId,
        subject: SubjectId,
        rights: &RightsMask,
        until: Option<SystemTime>,
    ) -> Result<(), DirectoryError>;
}
