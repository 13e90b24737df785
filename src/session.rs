//! Session orchestrator — one signed-in user on one shared canvas.
//!
//! ARCHITECTURE
//! ============
//! A session wires the components to a single channel connection:
//!
//! ```text
//! pointer ──► viewport (screen→canvas) ──► cursor throttle ──► cursors/{me}
//! drag    ──► lock CAS ──► drag throttle ──► objects/{id} {x,y}
//!                          end ──► validated update ──► release
//! start   ──► presence join ──► cursor init (hooks armed once)
//! ```
//!
//! LIFECYCLE
//! =========
//! `start` joins presence and arms the cursor cleanup. `sign_out` is the
//! intentional exit: it releases held locks, removes the cursor and leaves
//! presence explicitly. Dropping a session without `sign_out` does none of
//! that; the disconnect hooks clean up once the transport goes away.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::camera::Point;
use crate::channel::{ChannelError, SyncChannel};
use crate::config::SyncConfig;
use crate::cursor::CursorBroadcaster;
use crate::error::ErrorCode;
use crate::identity::Identity;
use crate::lock::{LockManager, LockOutcome};
use crate::object::{ObjectError, ObjectId, ObjectPatch, ObjectStore};
use crate::presence::PresenceTracker;
use crate::rate_limit::Throttle;
use crate::viewport::{ViewportController, ViewportStorage};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error("already dragging object {0}")]
    DragInProgress(ObjectId),
    #[error("no drag in progress")]
    NoActiveDrag,
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Channel(e) => e.error_code(),
            Self::Object(e) => e.error_code(),
            Self::DragInProgress(_) => "E_DRAG_IN_PROGRESS",
            Self::NoActiveDrag => "E_NO_ACTIVE_DRAG",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Channel(e) => e.retryable(),
            Self::Object(e) => e.retryable(),
            Self::DragInProgress(_) | Self::NoActiveDrag => false,
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

struct Drag {
    object_id: ObjectId,
    /// Latest requested position, committed at `end_drag`.
    last: Option<Point>,
    writer: Throttle<Point>,
}

pub struct Session {
    identity: Identity,
    config: SyncConfig,
    presence: PresenceTracker,
    cursor: CursorBroadcaster,
    objects: Arc<ObjectStore>,
    locks: LockManager,
    viewport: ViewportController,
    drag: Option<Drag>,
}

impl Session {
    /// Join presence and arm the cursor cleanup.
    ///
    /// # Errors
    ///
    /// Returns the channel error from the presence join or the cursor hook.
    /// Presence is left again if the cursor step fails.
    pub async fn start(
        channel: Arc<dyn SyncChannel>,
        identity: Identity,
        storage: Arc<dyn ViewportStorage>,
        config: SyncConfig,
    ) -> Result<Self, SessionError> {
        let viewport = ViewportController::load(storage, &config);

        let presence = PresenceTracker::new(Arc::clone(&channel));
        presence.join(&identity).await?;

        let cursor =
            match CursorBroadcaster::init(Arc::clone(&channel), identity.clone(), config.cursor_interval).await {
                Ok(cursor) => cursor,
                Err(e) => {
                    if let Err(undo) = presence.leave(&identity.id).await {
                        warn!(user_id = %identity.id, error = %undo, "presence rollback failed");
                    }
                    return Err(e.into());
                }
            };

        info!(user_id = %identity.id, name = %identity.display_name, "session started");
        Ok(Self {
            presence,
            cursor,
            objects: Arc::new(ObjectStore::new(Arc::clone(&channel))),
            locks: LockManager::new(channel),
            viewport,
            identity,
            config,
            drag: None,
        })
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    #[must_use]
    pub fn cursor(&self) -> &CursorBroadcaster {
        &self.cursor
    }

    #[must_use]
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    #[must_use]
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    #[must_use]
    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    /// Publish the pointer. Returns its canvas position.
    pub fn pointer_moved(&self, screen: Point) -> Point {
        let at = self.viewport.to_canvas(screen);
        self.cursor.update(at.x, at.y);
        at
    }

    /// Try to lock `object_id` for this user.
    ///
    /// # Errors
    ///
    /// Returns the channel error from the lock transaction.
    pub async fn acquire_lock(&self, object_id: ObjectId) -> Result<LockOutcome, SessionError> {
        Ok(self.locks.acquire_lock(object_id, &self.identity.id).await?)
    }

    /// # Errors
    ///
    /// Returns the channel error from the release.
    pub async fn release_lock(&self, object_id: ObjectId) -> Result<(), SessionError> {
        Ok(self.locks.release_lock(object_id).await?)
    }

    // =========================================================================
    // DRAG
    // =========================================================================

    /// Lock `object_id` and start a drag. Nothing starts unless the lock is
    /// granted; contention is returned as the outcome.
    ///
    /// # Errors
    ///
    /// `DragInProgress` if another drag is active, or the lock's channel error.
    pub async fn begin_drag(&mut self, object_id: ObjectId) -> Result<LockOutcome, SessionError> {
        if let Some(drag) = &self.drag {
            return Err(SessionError::DragInProgress(drag.object_id));
        }
        let outcome = self.locks.acquire_lock(object_id, &self.identity.id).await?;
        if !outcome.is_granted() {
            return Ok(outcome);
        }

        let objects = Arc::clone(&self.objects);
        let writer = Throttle::new(self.config.drag_interval, move |at: Point| {
            let objects = Arc::clone(&objects);
            async move {
                if let Err(e) = objects.update_during_interaction(object_id, at.x, at.y).await {
                    warn!(%object_id, error = %e, "drag frame write failed");
                }
            }
        });
        self.drag = Some(Drag { object_id, last: None, writer });
        debug!(%object_id, "drag started");
        Ok(outcome)
    }

    /// Move the dragged object to a canvas position. Written at the drag rate.
    /// Non-finite positions are dropped.
    ///
    /// # Errors
    ///
    /// `NoActiveDrag` if `begin_drag` was not granted.
    pub fn drag_to(&mut self, x: f64, y: f64) -> Result<(), SessionError> {
        let drag = self.drag.as_mut().ok_or(SessionError::NoActiveDrag)?;
        let at = Point::new(x, y);
        if !at.is_finite() {
            debug!(x, y, "ignoring non-finite drag position");
            return Ok(());
        }
        drag.last = Some(at);
        drag.writer.call(at);
        Ok(())
    }

    /// Finish the drag: commit the final position with a validated update,
    /// then release the lock. The lock is released even when the commit
    /// fails.
    ///
    /// # Errors
    ///
    /// `NoActiveDrag`, the commit's validation or channel error, or the
    /// release's channel error.
    pub async fn end_drag(&mut self) -> Result<(), SessionError> {
        let Drag { object_id, last, writer } = self.drag.take().ok_or(SessionError::NoActiveDrag)?;
        writer.close().await;

        let committed = match last {
            Some(at) => self.objects.update(object_id, &ObjectPatch::position(at.x, at.y)).await,
            None => Ok(()),
        };
        let released = self.locks.release_lock(object_id).await;
        debug!(%object_id, "drag ended");

        committed?;
        released?;
        Ok(())
    }

    #[must_use]
    pub fn dragging(&self) -> Option<ObjectId> {
        self.drag.as_ref().map(|d| d.object_id)
    }

    // =========================================================================
    // SIGN-OUT
    // =========================================================================

    /// Intentional exit. Every step runs even if an earlier one fails; the
    /// first error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first error from ending the drag, releasing locks,
    /// removing the cursor or leaving presence.
    pub async fn sign_out(mut self) -> Result<(), SessionError> {
        let mut first_error: Option<SessionError> = None;

        if self.drag.is_some() {
            if let Err(e) = self.end_drag().await {
                warn!(error = %e, "ending drag on sign-out failed");
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.locks.release_all().await {
            first_error.get_or_insert(e.into());
        }

        let Self { identity, presence, cursor, viewport, .. } = self;
        if let Err(e) = cursor.remove().await {
            warn!(user_id = %identity.id, error = %e, "cursor removal failed");
            first_error.get_or_insert(e.into());
        }
        if let Err(e) = presence.leave(&identity.id).await {
            warn!(user_id = %identity.id, error = %e, "presence leave failed");
            first_error.get_or_insert(e.into());
        }
        viewport.flush();

        info!(user_id = %identity.id, "signed out");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
