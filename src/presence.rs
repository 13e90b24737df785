//! Presence tracker — who is currently on the canvas.
//!
//! DESIGN
//! ======
//! A presence record lives at `presence/{userId}` exactly while the session
//! is active. Two exits remove it and both are needed:
//! - `leave` erases it explicitly on intentional sign-out;
//! - a disconnect hook registered at `join` erases it on transport loss.
//!
//! The hook is registered once per session, after the record write has
//! succeeded. If registration fails the record is rolled back so nothing
//! outlives a crash unguarded.

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::channel::{ChannelError, Subscription, SyncChannel, decode_children, path};
use crate::identity::{Identity, UserId};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub color: String,
}

impl From<&Identity> for PresenceRecord {
    fn from(identity: &Identity) -> Self {
        Self { user_id: identity.id.clone(), display_name: identity.display_name.clone(), color: identity.color.clone() }
    }
}

// =============================================================================
// TRACKER
// =============================================================================

pub struct PresenceTracker {
    channel: Arc<dyn SyncChannel>,
    /// Users whose disconnect hook is live on this connection.
    hooked: Mutex<HashSet<UserId>>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new(channel: Arc<dyn SyncChannel>) -> Self {
        Self { channel, hooked: Mutex::new(HashSet::new()) }
    }

    /// Publish the presence record, then arm its disconnect cleanup.
    ///
    /// Joining again with the same identity rewrites the record but does not
    /// register a second hook.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the write or the hook registration fails.
    /// In the latter case the record has been erased again.
    pub async fn join(&self, identity: &Identity) -> Result<(), ChannelError> {
        let path = path::presence(&identity.id);
        let record = serde_json::to_value(PresenceRecord::from(identity))?;
        self.channel.write(&path, record).await?;

        if self.is_hooked(&identity.id) {
            return Ok(());
        }
        if let Err(e) = self.channel.on_disconnect_erase(&path).await {
            if let Err(undo) = self.channel.erase(&path).await {
                warn!(user_id = %identity.id, error = %undo, "presence rollback failed");
            }
            return Err(e);
        }
        self.hooked_set().insert(identity.id.clone());

        info!(user_id = %identity.id, name = %identity.display_name, "joined presence");
        Ok(())
    }

    /// Remove the presence record on intentional sign-out.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the erase fails. The disconnect hook is
    /// left armed in that case.
    pub async fn leave(&self, user_id: &UserId) -> Result<(), ChannelError> {
        let path = path::presence(user_id);
        self.channel.erase(&path).await?;
        let was_hooked = self.hooked_set().remove(user_id);
        if was_hooked {
            self.channel.cancel_on_disconnect(&path).await?;
        }
        info!(%user_id, "left presence");
        Ok(())
    }

    /// Watch the full presence set.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the subscription cannot be opened.
    pub async fn subscribe(&self) -> Result<PresenceFeed, ChannelError> {
        let sub = self.channel.subscribe(&path::presence_root()).await?;
        Ok(PresenceFeed { sub })
    }

    fn is_hooked(&self, user_id: &UserId) -> bool {
        self.hooked_set().contains(user_id)
    }

    fn hooked_set(&self) -> std::sync::MutexGuard<'_, HashSet<UserId>> {
        self.hooked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// FEED
// =============================================================================

/// Stream of full presence lists. The first list is the state at subscribe time.
#[derive(Debug)]
pub struct PresenceFeed {
    sub: Subscription,
}

impl PresenceFeed {
    /// Next presence list, ordered by key. `None` once the channel closes.
    pub async fn next(&mut self) -> Option<Vec<PresenceRecord>> {
        let value = self.sub.recv().await?;
        Some(decode_children::<PresenceRecord>(value).records.into_iter().map(|(_, r)| r).collect())
    }

    pub fn unsubscribe(self) {}
}
