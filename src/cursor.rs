//! Cursor broadcaster — rate-limited pointer publishing.
//!
//! DESIGN
//! ======
//! Cursor positions are stored in canvas space at `cursors/{userId}` and are
//! converted to screen space only when a peer renders them. Publishes go
//! through a [`Throttle`] (~10 Hz by default): the first move fires at once,
//! later moves inside the window collapse into one trailing write carrying the
//! newest position.
//!
//! The disconnect hook is armed once in [`CursorBroadcaster::init`]. `update`
//! only ever writes the record; it never touches hooks, whatever the rate.

#[cfg(test)]
#[path = "cursor_test.rs"]
mod cursor_test;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::camera::{Point, Viewport, to_screen};
use crate::channel::{ChannelError, Path, Subscription, SyncChannel, decode_children, path};
use crate::identity::{Identity, UserId};
use crate::rate_limit::Throttle;

// =============================================================================
// TYPES
// =============================================================================

/// A user's pointer, in canvas coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorRecord {
    pub user_id: UserId,
    pub x: f64,
    pub y: f64,
    pub display_name: String,
    pub color: String,
}

impl CursorRecord {
    #[must_use]
    pub fn new(identity: &Identity, at: Point) -> Self {
        Self {
            user_id: identity.id.clone(),
            x: at.x,
            y: at.y,
            display_name: identity.display_name.clone(),
            color: identity.color.clone(),
        }
    }

    #[must_use]
    pub fn canvas_position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Where to draw this cursor on the local screen.
    #[must_use]
    pub fn screen_position(&self, viewport: &Viewport) -> Point {
        to_screen(self.canvas_position(), viewport)
    }
}

// =============================================================================
// BROADCASTER
// =============================================================================

pub struct CursorBroadcaster {
    channel: Arc<dyn SyncChannel>,
    identity: Identity,
    path: Path,
    throttle: Throttle<Point>,
}

impl CursorBroadcaster {
    /// Arm the crash cleanup for this user's cursor and start the publisher.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the disconnect hook cannot be registered.
    pub async fn init(
        channel: Arc<dyn SyncChannel>,
        identity: Identity,
        interval: Duration,
    ) -> Result<Self, ChannelError> {
        let path = path::cursor(&identity.id);
        channel.on_disconnect_erase(&path).await?;

        let publish_channel = Arc::clone(&channel);
        let publish_path = path.clone();
        let publish_identity = identity.clone();
        let throttle = Throttle::new(interval, move |at: Point| {
            let channel = Arc::clone(&publish_channel);
            let path = publish_path.clone();
            let record = CursorRecord::new(&publish_identity, at);
            async move {
                let value = match serde_json::to_value(&record) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(error = %e, "cursor record did not encode");
                        return;
                    }
                };
                if let Err(e) = channel.write(&path, value).await {
                    warn!(user_id = %record.user_id, error = %e, "cursor publish failed");
                }
            }
        });

        info!(user_id = %identity.id, ?interval, "cursor broadcaster ready");
        Ok(Self { channel, identity, path, throttle })
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.identity.id
    }

    /// Publish a canvas-space position, rate limited. Non-finite positions are
    /// dropped.
    pub fn update(&self, x: f64, y: f64) {
        let at = Point::new(x, y);
        if !at.is_finite() {
            debug!(x, y, "ignoring non-finite cursor position");
            return;
        }
        self.throttle.call(at);
    }

    /// Watch every cursor on the canvas, this user's included.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the subscription cannot be opened.
    pub async fn subscribe(&self) -> Result<CursorFeed, ChannelError> {
        let sub = self.channel.subscribe(&path::cursors_root()).await?;
        Ok(CursorFeed { sub, exclude: None })
    }

    /// Remove this user's cursor on intentional leave.
    ///
    /// Pending publishes are discarded and an in-flight one is awaited first,
    /// so no late write can resurrect the record.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the erase fails.
    pub async fn remove(self) -> Result<(), ChannelError> {
        let Self { channel, identity, path, throttle } = self;
        throttle.close().await;
        channel.erase(&path).await?;
        channel.cancel_on_disconnect(&path).await?;
        info!(user_id = %identity.id, "cursor removed");
        Ok(())
    }
}

// =============================================================================
// FEED
// =============================================================================

/// Stream of cursor lists. The first list is the state at subscribe time.
#[derive(Debug)]
pub struct CursorFeed {
    sub: Subscription,
    exclude: Option<UserId>,
}

impl CursorFeed {
    /// Leave `user_id` out of every list (typically the local user).
    #[must_use]
    pub fn without(mut self, user_id: UserId) -> Self {
        self.exclude = Some(user_id);
        self
    }

    /// Next cursor list. `None` once the channel closes.
    pub async fn next(&mut self) -> Option<Vec<CursorRecord>> {
        let value = self.sub.recv().await?;
        let exclude = &self.exclude;
        Some(
            decode_children::<CursorRecord>(value)
                .records
                .into_iter()
                .map(|(_, r)| r)
                .filter(|r| exclude.as_ref() != Some(&r.user_id))
                .collect(),
        )
    }

    pub fn unsubscribe(self) {}
}
