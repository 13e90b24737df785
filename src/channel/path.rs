//! Slash-separated store paths and the logical path layout.

#[cfg(test)]
#[path = "path_test.rs"]
mod path_test;

use std::fmt;

use uuid::Uuid;

use super::ChannelError;
use crate::identity::UserId;

/// Root of the presence records.
pub const PRESENCE: &str = "presence";
/// Root of the cursor records.
pub const CURSORS: &str = "cursors";
/// Root of the shared objects.
pub const OBJECTS: &str = "objects";
/// Lock field inside an object record.
pub const LOCKED_BY: &str = "lockedBy";

/// A path into the store, e.g. `objects/{id}/lockedBy`.
///
/// Segments are non-empty and never contain `/`. The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(Vec<String>);

impl Path {
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a slash-separated path. Leading/trailing slashes are ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for empty inner segments (`a//b`).
    pub fn parse(raw: &str) -> Result<Self, ChannelError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let segments: Vec<String> = trimmed.split('/').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(ChannelError::InvalidPath(raw.to_owned()));
        }
        Ok(Self(segments))
    }

    /// Append one segment. Slashes inside `segment` are not split.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `self` equals `other` or lies above it.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.0.len() >= self.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a == b)
    }

    /// True when one path contains the other, so a change to either is
    /// visible at both.
    #[must_use]
    pub fn overlaps(&self, other: &Path) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

// =============================================================================
// LAYOUT
// =============================================================================

#[must_use]
pub fn presence_root() -> Path {
    Path::root().child(PRESENCE)
}

#[must_use]
pub fn presence(user_id: &UserId) -> Path {
    presence_root().child(user_id.as_str())
}

#[must_use]
pub fn cursors_root() -> Path {
    Path::root().child(CURSORS)
}

#[must_use]
pub fn cursor(user_id: &UserId) -> Path {
    cursors_root().child(user_id.as_str())
}

#[must_use]
pub fn objects_root() -> Path {
    Path::root().child(OBJECTS)
}

#[must_use]
pub fn object(object_id: Uuid) -> Path {
    objects_root().child(object_id.to_string())
}

/// Transaction target for the object's lock.
#[must_use]
pub fn object_lock(object_id: Uuid) -> Path {
    object(object_id).child(LOCKED_BY)
}
