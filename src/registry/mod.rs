//! Channel-group and exemption registry.
//!
//! Reads are lock-free snapshots published through an [`ArcSwap`]; mutations
//! serialize behind a single writer lock, persist through the configured
//! [`RegistryStore`], then publish the new snapshot and bump a watch
//! generation so long-lived consumers notice the change.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RegistrySnapshot`] | Immutable point-in-time view |
//! | [`Registry`] | Synchronized handle: snapshot reads, persisted writes |
//! | [`RegistryStore`] | Persistence seam (JSON files, in-memory) |

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::error::ErrorContext;
use crate::types::{ChannelId, GroupName, SubjectId};
use crate::{Error, Result};

pub mod store;

pub use store::{InMemoryStore, JsonFileStore, RegistryContents, RegistryStore, StoreError};

/// Immutable point-in-time view of the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Group name -> ordered channel list. Iteration order is insertion order.
    pub groups: IndexMap<GroupName, Vec<ChannelId>>,
    /// Subjects exempt from remove sweeps.
    pub authorized: BTreeSet<SubjectId>,
    /// Administrator subjects: exempt from remove sweeps and allowed to
    /// issue requests. Configured at open time, never persisted.
    pub admins: BTreeSet<SubjectId>,
}

impl RegistrySnapshot {
    pub fn group(&self, name: &GroupName) -> Option<&[ChannelId]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &GroupName> {
        self.groups.keys()
    }

    pub fn is_authorized(&self, subject: SubjectId) -> bool {
        self.authorized.contains(&subject)
    }

    pub fn is_admin(&self, subject: SubjectId) -> bool {
        self.admins.contains(&subject)
    }

    /// True when `subject` must be left alone by a remove sweep.
    pub fn is_exempt(&self, subject: SubjectId) -> bool {
        self.is_authorized(subject) || self.is_admin(subject)
    }
}

/// Shared registry handle.
///
/// Cheap to share behind an [`Arc`]; every reader gets a consistent snapshot
/// and never blocks a writer.
pub struct Registry {
    store: Arc<dyn RegistryStore>,
    snapshot: ArcSwap<RegistrySnapshot>,
    writer: Mutex<()>,
    generation: watch::Sender<u64>,
}

impl Registry {
    /// Load the registry from `store`. `admins` is the configured
    /// administrator set; it rides along in every snapshot.
    pub async fn open(store: Arc<dyn RegistryStore>, admins: BTreeSet<SubjectId>) -> Result<Self> {
        let contents = store.load().await?;
        validate_contents(&contents)?;

        let snapshot = RegistrySnapshot {
            groups: contents.groups,
            authorized: contents.authorized,
            admins,
        };
        info!(
            groups = snapshot.groups.len(),
            authorized = snapshot.authorized.len(),
            admins = snapshot.admins.len(),
            "registry loaded"
        );

        let (generation, _) = watch::channel(0u64);
        Ok(Self {
            store,
            snapshot: ArcSwap::from_pointee(snapshot),
            writer: Mutex::new(()),
            generation,
        })
    }

    /// Current snapshot. Lock-free; the returned view never changes.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    /// Receiver that observes the generation counter bump after every
    /// published mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    /// Generation of the currently published snapshot.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Add `channel` to `group`, creating the group if needed.
    /// Rejects duplicates within a group.
    pub async fn add_channel(&self, group: GroupName, channel: ChannelId) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut next = (*self.snapshot.load_full()).clone();

        let channels = next.groups.entry(group.clone()).or_default();
        if channels.contains(&channel) {
            return Err(Error::validation_with_context(
                "channel is already in the group",
                ErrorContext::new()
                    .with_field_path(format!("groups.{}", group))
                    .with_details(channel.to_string())
                    .with_source("registry"),
            ));
        }
        channels.push(channel);

        self.persist_and_publish(next).await?;
        info!(%group, %channel, "channel added to group");
        Ok(())
    }

    /// Remove `channel` from `group`. The group stays registered even when
    /// it becomes empty.
    pub async fn remove_channel(&self, group: &GroupName, channel: ChannelId) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut next = (*self.snapshot.load_full()).clone();

        let channels = next.groups.get_mut(group).ok_or_else(|| {
            Error::validation_with_context(
                "unknown group",
                ErrorContext::new()
                    .with_field_path(format!("groups.{}", group))
                    .with_source("registry"),
            )
        })?;
        let before = channels.len();
        channels.retain(|c| *c != channel);
        if channels.len() == before {
            return Err(Error::validation_with_context(
                "channel is not in the group",
                ErrorContext::new()
                    .with_field_path(format!("groups.{}", group))
                    .with_details(channel.to_string())
                    .with_source("registry"),
            ));
        }

        self.persist_and_publish(next).await?;
        info!(%group, %channel, "channel removed from group");
        Ok(())
    }

    /// Exempt `subject` from remove sweeps. Returns `false` when the subject
    /// was already exempt; nothing is persisted in that case.
    pub async fn authorize(&self, subject: SubjectId) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let mut next = (*self.snapshot.load_full()).clone();

        if !next.authorized.insert(subject) {
            return Ok(false);
        }

        self.persist_and_publish(next).await?;
        info!(%subject, "subject authorized");
        Ok(true)
    }

    /// Drop `subject` from the exemption set. Returns `false` when the
    /// subject was not exempt.
    pub async fn deauthorize(&self, subject: SubjectId) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let mut next = (*self.snapshot.load_full()).clone();

        if !next.authorized.remove(&subject) {
            return Ok(false);
        }

        self.persist_and_publish(next).await?;
        info!(%subject, "subject deauthorized");
        Ok(true)
    }

    /// Persist first, publish second: a failed save leaves the published
    /// snapshot untouched.
    async fn persist_and_publish(&self, next: RegistrySnapshot) -> Result<()> {
        let contents = RegistryContents {
            groups: next.groups.clone(),
            authorized: next.authorized.clone(),
        };
        self.store.save(&contents).await?;
        self.snapshot.store(Arc::new(next));
        self.generation.send_modify(|generation| *generation += 1);
        Ok(())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

fn validate_contents(contents: &RegistryContents) -> Result<()> {
    for (name, channels) in &contents.groups {
        let mut seen = std::collections::HashSet::with_capacity(channels.len());
        for channel in channels {
            if !seen.insert(channel) {
                return Err(Error::configuration_with_context(
                    "duplicate channel within a group",
                    ErrorContext::new()
                        .with_field_path(format!("groups.{}", name))
                        .with_details(channel.to_string())
                        .with_source("registry_loader"),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_empty() -> (Arc<InMemoryStore>, Registry) {
        let store = Arc::new(InMemoryStore::new());
        let registry = Registry::open(store.clone(), BTreeSet::new()).await.unwrap();
        (store, registry)
    }

    #[tokio::test]
    async fn test_add_channel_creates_group_and_persists() {
        let (store, registry) = open_empty().await;
        registry
            .add_channel(GroupName::new("vip"), ChannelId(-100))
            .await
            .unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(
            snapshot.group(&GroupName::new("vip")),
            Some([ChannelId(-100)].as_slice())
        );
        assert_eq!(store.save_count(), 1);
        assert_eq!(registry.generation(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_channel_in_group_rejected() {
        let (store, registry) = open_empty().await;
        let group = GroupName::new("vip");
        registry.add_channel(group.clone(), ChannelId(-1)).await.unwrap();

        let err = registry.add_channel(group, ChannelId(-1)).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        // The failed mutation must not persist or publish anything.
        assert_eq!(store.save_count(), 1);
        assert_eq!(registry.generation(), 1);
    }

    #[tokio::test]
    async fn test_channel_order_within_group_is_insertion_order() {
        let (_, registry) = open_empty().await;
        let group = GroupName::new("vip");
        for id in [-3, -1, -2] {
            registry.add_channel(group.clone(), ChannelId(id)).await.unwrap();
        }

        let snapshot = registry.snapshot();
        let ids: Vec<i64> = snapshot.group(&group).unwrap().iter().map(|c| c.0).collect();
        assert_eq!(ids, vec![-3, -1, -2]);
    }

    #[tokio::test]
    async fn test_remove_channel_keeps_empty_group() {
        let (_, registry) = open_empty().await;
        let group = GroupName::new("vip");
        registry.add_channel(group.clone(), ChannelId(-1)).await.unwrap();
        registry.remove_channel(&group, ChannelId(-1)).await.unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.group(&group), Some([].as_slice()));

        let err = registry
            .remove_channel(&group, ChannelId(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_remove_channel_from_unknown_group() {
        let (_, registry) = open_empty().await;
        let err = registry
            .remove_channel(&GroupName::new("ghost"), ChannelId(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_authorize_is_idempotent() {
        let (store, registry) = open_empty().await;
        assert!(registry.authorize(SubjectId(5)).await.unwrap());
        assert!(!registry.authorize(SubjectId(5)).await.unwrap());
        // Only the effective mutation persisted.
        assert_eq!(store.save_count(), 1);

        assert!(registry.deauthorize(SubjectId(5)).await.unwrap());
        assert!(!registry.deauthorize(SubjectId(5)).await.unwrap());
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_is_stable_across_mutations() {
        let (_, registry) = open_empty().await;
        let before = registry.snapshot();
        registry
            .add_channel(GroupName::new("vip"), ChannelId(-1))
            .await
            .unwrap();

        assert!(before.groups.is_empty());
        assert_eq!(registry.snapshot().groups.len(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_observe_generation_bumps() {
        let (_, registry) = open_empty().await;
        let mut updates = registry.subscribe();
        assert_eq!(*updates.borrow_and_update(), 0);

        registry
            .add_channel(GroupName::new("vip"), ChannelId(-1))
            .await
            .unwrap();

        updates.changed().await.unwrap();
        assert_eq!(*updates.borrow_and_update(), 1);
    }

    #[tokio::test]
    async fn test_open_rejects_duplicate_channels_in_stored_contents() {
        let mut groups = IndexMap::new();
        groups.insert(GroupName::new("vip"), vec![ChannelId(-1), ChannelId(-1)]);
        let store = Arc::new(InMemoryStore::with_contents(RegistryContents {
            groups,
            authorized: BTreeSet::new(),
        }));

        let err = Registry::open(store, BTreeSet::new()).await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_admins_ride_along_in_snapshots() {
        let store = Arc::new(InMemoryStore::new());
        let registry = Registry::open(store, BTreeSet::from([SubjectId(9)]))
            .await
            .unwrap();

        let snapshot = registry.snapshot();
        assert!(snapshot.is_admin(SubjectId(9)));
        assert!(snapshot.is_exempt(SubjectId(9)));
        assert!(!snapshot.is_authorized(SubjectId(9)));
    }
}
