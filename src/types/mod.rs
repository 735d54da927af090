//! Core type definitions for moderation actions.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`identity`] | Channel, subject and group identifiers |
//! | [`action`] | Action kinds, rights masks and action descriptors |
//! | [`request`] | Operation requests and target scopes |

pub mod action;
pub mod identity;
pub mod request;

pub use action::{ActionDescriptor, ActionKind, RightsMask};
pub use identity::{ChannelId, ChannelRef, Entity, EntityId, GroupName, Participant, Subject, SubjectId};
pub use request::{OperationRequest, TargetScope};
