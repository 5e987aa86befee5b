//! Core types shared by the discovery and monitoring layers
//!
//! Everything here is plain data handed across the boundary with the host
//! editor: element activity, pending changes, worksets and project identity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an element in the shared design model
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub String);

impl ElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a collaborating user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of edit a user performed on an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityType {
    Modified,
    Moved,
    Deleted,
    Viewed,
    Created,
}

impl ActivityType {
    /// Past-tense verb used in conflict descriptions
    pub fn verb(&self) -> &'static str {
        match self {
            ActivityType::Modified => "modified",
            ActivityType::Moved => "moved",
            ActivityType::Deleted => "deleted",
            ActivityType::Viewed => "viewed",
            ActivityType::Created => "created",
        }
    }

    /// Whether this activity changes the shared model.
    pub fn is_edit(&self) -> bool {
        !matches!(self, ActivityType::Viewed)
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.verb())
    }
}

/// A single, immutable edit fact reported for one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementActivity {
    pub element_id: ElementId,
    pub element_name: String,
    pub category: String,
    pub level_name: String,
    pub user_id: UserId,
    pub username: String,
    pub activity_type: ActivityType,
    /// Changed parameter name → new value
    #[serde(default)]
    pub changes: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl ElementActivity {
    /// Create an activity stamped with the current time.
    pub fn new(
        element_id: impl Into<ElementId>,
        user_id: impl Into<UserId>,
        activity_type: ActivityType,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            element_id: element_id.into(),
            element_name: String::new(),
            category: String::new(),
            level_name: String::new(),
            username: user_id.0.clone(),
            user_id,
            activity_type,
            changes: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_element_name(mut self, name: impl Into<String>) -> Self {
        self.element_name = name.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level_name = level.into();
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_change(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.changes.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// What a pending (unsynced) local change touches
///
/// Serialized as its plain name, so host payloads can carry any kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeType {
    Geometry,
    Parameters,
    Other(String),
}

impl From<&str> for ChangeType {
    fn from(s: &str) -> Self {
        match s {
            "Geometry" => ChangeType::Geometry,
            "Parameters" => ChangeType::Parameters,
            other => ChangeType::Other(other.to_string()),
        }
    }
}

impl From<String> for ChangeType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Geometry" => ChangeType::Geometry,
            "Parameters" => ChangeType::Parameters,
            _ => ChangeType::Other(s),
        }
    }
}

impl From<ChangeType> for String {
    fn from(change_type: ChangeType) -> Self {
        match change_type {
            ChangeType::Other(s) => s,
            known => known.to_string(),
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Geometry => f.write_str("Geometry"),
            ChangeType::Parameters => f.write_str("Parameters"),
            ChangeType::Other(s) => f.write_str(s),
        }
    }
}

/// An edit made locally that has not been synced to the shared model yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub element_id: ElementId,
    pub element_name: String,
    pub change_type: ChangeType,
}

impl PendingChange {
    pub fn new(
        element_id: impl Into<ElementId>,
        element_name: impl Into<String>,
        change_type: impl Into<ChangeType>,
    ) -> Self {
        Self {
            element_id: element_id.into(),
            element_name: element_name.into(),
            change_type: change_type.into(),
        }
    }
}

/// Ownership record for a workset, refreshed by the host editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksetInfo {
    pub name: String,
    /// Empty when nobody has borrowed the workset
    #[serde(default)]
    pub owner: String,
}

/// The shared project this instance is working on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    #[serde(default)]
    pub guid: String,
}

impl ProjectInfo {
    pub fn new(name: impl Into<String>, guid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guid: guid.into(),
        }
    }

    /// Two projects are the same if the names match exactly or both carry
    /// the same non-empty guid.
    pub fn matches(&self, name: &str, guid: &str) -> bool {
        if self.name == name {
            return true;
        }
        !self.guid.is_empty() && self.guid.eq_ignore_ascii_case(guid)
    }
}
