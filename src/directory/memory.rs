use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Instant, SystemTime};

use crate::types::{ChannelId, Entity, EntityId, Participant, RightsMask, SubjectId};

use super::{Directory, DirectoryError};

/// One recorded `apply_restriction` invocation and its scripted outcome.
#[derive(Debug, Clone)]
pub struct AppliedAction {
    pub channel: ChannelId,
    pub subject: SubjectId,
    pub rights: RightsMask,
    pub until: Option<SystemTime>,
    pub at: Instant,
    pub outcome: Result<(), DirectoryError>,
}

#[derive(Default)]
struct Inner {
    entities: HashMap<EntityId, Entity>,
    resolve_failures: HashMap<EntityId, DirectoryError>,
    members: HashMap<ChannelId, Vec<Participant>>,
    participant_failures: HashMap<ChannelId, DirectoryError>,
    apply_scripts: HashMap<ChannelId, VecDeque<Result<(), DirectoryError>>>,
    applied: Vec<AppliedAction>,
}

/// In-memory directory with scriptable failures.
///
/// Unknown identities fail to resolve; channels without a script succeed on
/// every action. Every action call is recorded with a timestamp so tests can
/// assert throttle spacing and retry sequencing.
#[derive(Default)]
pub struct InMemoryDirectory {
    inner: Mutex<Inner>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolvable entity.
    pub fn add_entity(&self, entity: Entity) {
        let mut inner = self.inner.lock().unwrap();
        inner.entities.insert(entity.id, entity);
    }

    /// Register a channel with a display title.
    pub fn add_channel(&self, channel: ChannelId, title: &str) {
        self.add_entity(Entity::new(channel.0).with_display_name(title));
    }

    /// Register a subject with a display handle.
    pub fn add_subject(&self, subject: SubjectId, handle: &str) {
        self.add_entity(Entity::new(subject.0).with_display_name(handle));
    }

    /// Register a service bot account.
    pub fn add_bot(&self, subject: SubjectId, handle: &str) {
        self.add_entity(Entity::new(subject.0).with_display_name(handle).bot());
    }

    /// Set the channel's membership page.
    pub fn set_members(&self, channel: ChannelId, members: Vec<Participant>) {
        let mut inner = self.inner.lock().unwrap();
        inner.members.insert(channel, members);
    }

    /// Make `resolve(id)` fail with `error` instead of looking the id up.
    pub fn fail_resolve(&self, id: EntityId, error: DirectoryError) {
        let mut inner = self.inner.lock().unwrap();
        inner.resolve_failures.insert(id, error);
    }

    /// Make `list_participants(channel)` fail with `error`.
    pub fn fail_participants(&self, channel: ChannelId, error: DirectoryError) {
        let mut inner = self.inner.lock().unwrap();
        inner.participant_failures.insert(channel, error);
    }

    /// Script the next action outcomes for `channel`, consumed in order.
    /// Once the script runs out, further actions succeed.
    pub fn script_apply(
        &self,
        channel: ChannelId,
        results: impl IntoIterator<Item = Result<(), DirectoryError>>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .apply_scripts
            .entry(channel)
            .or_default()
            .extend(results);
    }

    /// Every action call recorded so far, in invocation order.
    pub fn applied(&self) -> Vec<AppliedAction> {
        self.inner.lock().unwrap().applied.clone()
    }

    /// Drop the recorded action log.
    pub fn clear_applied(&self) {
        self.inner.lock().unwrap().applied.clear();
    }

    /// Subjects of the successful action calls against `channel`.
    pub fn applied_subjects(&self, channel: ChannelId) -> Vec<SubjectId> {
        self.inner
            .lock()
            .unwrap()
            .applied
            .iter()
            .filter(|call| call.channel == channel && call.outcome.is_ok())
            .map(|call| call.subject)
            .collect()
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn resolve(&self, id: EntityId) -> Result<Entity, DirectoryError> {
        let inner = self.inner.lock().unwrap();
        if let Some(error) = inner.resolve_failures.get(&id) {
            return Err(error.clone());
        }
        inner
            .entities
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::NotFound { id })
    }

    async fn list_participants(
        &self,
        channel: ChannelId,
    ) -> Result<Vec<Participant>, DirectoryError> {
        let inner = self.inner.lock().unwrap();
        if let Some(error) = inner.participant_failures.get(&channel) {
            return Err(error.clone());
        }
        Ok(inner.members.get(&channel).cloned().unwrap_or_default())
    }

    async fn apply_restriction(
        &self,
        channel: ChannelId,
        subject: SubjectId,
        rights: &RightsMask,
        until: Option<SystemTime>,
    ) -> Result<(), DirectoryError> {
        let mut inner = self.inner.lock().unwrap();
        let outcome = inner
            .apply_scripts
            .get_mut(&channel)
            .and_then(|script| script.pop_front())
            .unwrap_or(Ok(()));
        inner.applied.push(AppliedAction {
            channel,
            subject,
            rights: *rights,
            until,
            at: Instant::now(),
            outcome: outcome.clone(),
        });
        outcome
    }
}
