use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Raw identifier in the directory service's shared id space.
///
/// Channels and subjects live in one numeric namespace on the wire; the
/// typed wrappers below keep them apart everywhere else.
pub type EntityId = i64;

/// Identifier of a channel endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub EntityId);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a subject (the identity an action is applied to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub EntityId);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Case-folded name of a channel group.
///
/// Names are folded to lowercase on construction so lookups are
/// case-insensitive regardless of how the hosting layer captured them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(String);

impl GroupName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A subject with its optional display handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub handle: Option<String>,
}

impl Subject {
    pub fn new(id: SubjectId) -> Self {
        Self { id, handle: None }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.handle {
            Some(handle) => write!(f, "@{}", handle),
            None => write!(f, "ID:{}", self.id),
        }
    }
}

/// A resolved directory entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub display_name: Option<String>,
    pub is_bot: bool,
}

impl Entity {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            display_name: None,
            is_bot: false,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn bot(mut self) -> Self {
        self.is_bot = true;
        self
    }
}

/// A channel reference carrying whatever display data resolution produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: ChannelId,
    pub title: Option<String>,
}

impl ChannelRef {
    pub fn new(id: ChannelId) -> Self {
        Self { id, title: None }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Human-readable label: the resolved title, or the raw id.
    pub fn label(&self) -> String {
        match &self.title {
            Some(title) => title.clone(),
            None => self.id.to_string(),
        }
    }
}

/// One membership record returned by a participant listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub subject: SubjectId,
    pub joined_at: Option<SystemTime>,
}

impl Participant {
    pub fn new(subject: SubjectId) -> Self {
        Self {
            subject,
            joined_at: None,
        }
    }

    pub fn joined(mut self, at: SystemTime) -> Self {
        self.joined_at = Some(at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_name_case_folding() {
        assert_eq!(GroupName::new("VIP"), GroupName::new("vip"));
        assert_eq!(GroupName::new("News").as_str(), "news");
    }

    #[test]
    fn test_subject_display() {
        let with_handle = Subject::new(SubjectId(42)).with_handle("spammer");
        assert_eq!(with_handle.to_string(), "@spammer");

        let bare = Subject::new(SubjectId(42));
        assert_eq!(bare.to_string(), "ID:42");
    }

    #[test]
    fn test_channel_ref_label_falls_back_to_id() {
        let named = ChannelRef::new(ChannelId(-100)).with_title("Main Channel");
        assert_eq!(named.label(), "Main Channel");

        let bare = ChannelRef::new(ChannelId(-100));
        assert_eq!(bare.label(), "-100");
    }

    #[test]
    fn test_channel_id_serde_is_transparent() {
        let json = serde_json::to_string(&ChannelId(-1001234)).unwrap();
        assert_eq!(json, "-1001234");
        let back: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChannelId(-1001234));
    }
}
