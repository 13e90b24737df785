//! Lock manager — exclusive per-object edit claims.
//!
//! DESIGN
//! ======
//! A lock is the value at `objects/{id}/lockedBy`. `acquire_lock` runs a
//! compare-and-set transaction on that path: it commits the caller's id when
//! the field is absent, null or `""`, or already holds the caller, and aborts
//! otherwise. The
//! store serializes transactions on a path, so concurrent acquirers get
//! exactly one winner. There is no waiting and no retry; contention is a
//! normal `LockOutcome`, not an error.
//!
//! A granted acquisition arms one disconnect hook that clears the field. The
//! hook belongs to this acquisition: re-acquiring a lock this manager already
//! holds does not register another, and `release_lock` cancels it. If the
//! manager finds its lock taken over by someone else (the field was cleared
//! and re-acquired behind its back), the hook is cancelled so a later
//! disconnect cannot erase the new holder's claim.
//!
//! A holder's disconnect release racing a third party's acquire is resolved by
//! whichever the store applies first.

#[cfg(test)]
#[path = "lock_test.rs"]
mod lock_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::channel::{ChannelError, Path, SyncChannel, TransactOutcome, Transaction, path};
use crate::identity::UserId;
use crate::object::ObjectId;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Granted,
    /// Someone else holds the lock. The holder is `None` when the stored
    /// value is not a string.
    LockedByOther(Option<UserId>),
}

impl LockOutcome {
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

// =============================================================================
// MANAGER
// =============================================================================

pub struct LockManager {
    channel: Arc<dyn SyncChannel>,
    /// Locks granted through this manager whose disconnect hook is armed.
    held: Mutex<HashMap<ObjectId, UserId>>,
}

impl LockManager {
    #[must_use]
    pub fn new(channel: Arc<dyn SyncChannel>) -> Self {
        Self { channel, held: Mutex::new(HashMap::new()) }
    }

    /// Try to claim `object_id` for `user_id`. One round trip, never retried.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the transaction fails, or if the
    /// disconnect hook cannot be armed (the lock is released again first).
    pub async fn acquire_lock(&self, object_id: ObjectId, user_id: &UserId) -> Result<LockOutcome, ChannelError> {
        let lock_path = path::object_lock(object_id);
        let me = user_id.as_str().to_owned();
        let outcome = self
            .channel
            .transact(
                &lock_path,
                Box::new(move |current: Option<&Value>| match current {
                    None | Some(Value::Null) => Transaction::Set(Value::String(me.clone())),
                    Some(Value::String(holder)) if holder.is_empty() || *holder == me => {
                        Transaction::Set(Value::String(me.clone()))
                    }
                    Some(_) => Transaction::Abort,
                }),
            )
            .await?;

        if let TransactOutcome::Aborted(current) = outcome {
            let holder = holder_of(current.as_ref());
            debug!(%object_id, %user_id, ?holder, "lock held by another user");
            self.forget_lost(object_id, &lock_path).await;
            return Ok(LockOutcome::LockedByOther(holder));
        }

        if self.held_map().get(&object_id) == Some(user_id) {
            return Ok(LockOutcome::Granted);
        }
        if let Err(e) = self.channel.on_disconnect_erase(&lock_path).await {
            if let Err(undo) = self.channel.erase(&lock_path).await {
                warn!(%object_id, error = %undo, "lock rollback failed");
            }
            return Err(e);
        }
        self.held_map().insert(object_id, user_id.clone());

        info!(%object_id, %user_id, "lock granted");
        Ok(LockOutcome::Granted)
    }

    /// Clear the lock field unconditionally. Releasing an unlocked object is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the write fails. A hook armed by this
    /// manager stays armed in that case.
    pub async fn release_lock(&self, object_id: ObjectId) -> Result<(), ChannelError> {
        let lock_path = path::object_lock(object_id);
        self.channel.write(&lock_path, Value::Null).await?;
        let was_held = self.held_map().remove(&object_id).is_some();
        if was_held {
            self.channel.cancel_on_disconnect(&lock_path).await?;
            info!(%object_id, "lock released");
        }
        Ok(())
    }

    /// Release every lock this manager holds. Keeps going past failures and
    /// returns the first one.
    ///
    /// # Errors
    ///
    /// Returns the first channel error encountered.
    pub async fn release_all(&self) -> Result<(), ChannelError> {
        let mut first_error = None;
        for object_id in self.held() {
            if let Err(e) = self.release_lock(object_id).await {
                warn!(%object_id, error = %e, "lock release failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Objects whose lock was granted through this manager and not released.
    #[must_use]
    pub fn held(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.held_map().keys().copied().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn holds(&self, object_id: ObjectId) -> bool {
        self.held_map().contains_key(&object_id)
    }

    /// Drop bookkeeping for a lock this manager believed it held but that now
    /// belongs to someone else.
    async fn forget_lost(&self, object_id: ObjectId, lock_path: &Path) {
        let lost = self.held_map().remove(&object_id).is_some();
        if !lost {
            return;
        }
        if let Err(e) = self.channel.cancel_on_disconnect(lock_path).await {
            warn!(%object_id, error = %e, "stale lock hook not cancelled");
        }
        info!(%object_id, "lock lost to another user");
    }

    fn held_map(&self) -> MutexGuard<'_, HashMap<ObjectId, UserId>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn holder_of(value: Option<&Value>) -> Option<UserId> {
    match value {
        Some(Value::String(raw)) if !raw.is_empty() => Some(UserId::new(raw.as_str())),
        _ => None,
    }
}
