//! Authenticated identity as handed to the sync core.
//!
//! Identities come from the authentication collaborator and are immutable for
//! the session. `Identity::new` is the convenience path used when the caller
//! has only a display name: a random id and a palette color.

#[cfg(test)]
#[path = "identity_test.rs"]
mod identity_test;

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::consts::PALETTE;

/// Opaque stable user id, as issued by the authentication provider.
///
/// Any non-empty string is accepted; the id is used verbatim as a path
/// segment (`presence/{id}`, `cursors/{id}`) and as the lock holder value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Random id for callers without an auth provider.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for UserId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: UserId,
    pub display_name: String,
    /// Hex color from [`PALETTE`].
    pub color: String,
}

impl Identity {
    /// Fresh identity with a random id and a random palette color.
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self::with_color(UserId::random(), display_name, random_color())
    }

    #[must_use]
    pub fn with_color(id: UserId, display_name: impl Into<String>, color: impl Into<String>) -> Self {
        Self { id, display_name: display_name.into(), color: color.into() }
    }
}

/// Pick a palette color uniformly at random.
#[must_use]
pub fn random_color() -> String {
    let idx = rand::rng().random_range(0..PALETTE.len());
    PALETTE[idx].to_owned()
}
