//! Object store — shared canvas objects over the Sync Channel.
//!
//! DESIGN
//! ======
//! Objects live at `objects/{objectId}` and are owned by the channel; this
//! module only validates and forwards. `create` and `update` reject any
//! non-finite numeric field before a single byte is written.
//! `update_during_interaction` is the unvalidated fast path for drag frames;
//! the validated `update` at interaction end is the authoritative write.
//!
//! Snapshots are rebuilt from the live subscription on every change. Records
//! that fail to decode or validate are left out of the snapshot and listed in
//! `ObjectsSnapshot::invalid`; nothing here deletes them.

#[cfg(test)]
#[path = "object_test.rs"]
mod object_test;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::camera::Point;
use crate::channel::{ChannelError, Subscription, SyncChannel, decode_children, path};
use crate::error::ErrorCode;
use crate::identity::UserId;

/// Opaque stable object id.
pub type ObjectId = Uuid;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    #[default]
    Rectangle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasObject {
    pub id: ObjectId,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: String,
    /// Lock holder. Only the lock manager writes this field. An empty or
    /// non-string value decodes as unlocked.
    #[serde(default, deserialize_with = "lock_holder", skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<UserId>,
}

impl CanvasObject {
    /// Unlocked rectangle with a fresh id.
    #[must_use]
    pub fn rectangle(x: f64, y: f64, width: f64, height: f64, color: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ObjectKind::Rectangle,
            x,
            y,
            width,
            height,
            color: color.into(),
            locked_by: None,
        }
    }

    #[must_use]
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }

    /// Locked by someone other than `user_id`.
    #[must_use]
    pub fn is_locked_by_other(&self, user_id: &UserId) -> bool {
        self.locked_by.as_ref().is_some_and(|holder| holder != user_id)
    }

    /// # Errors
    ///
    /// Returns the first non-finite numeric field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_finite("x", self.x)?;
        check_finite("y", self.y)?;
        check_finite("width", self.width)?;
        check_finite("height", self.height)
    }
}

fn lock_holder<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<UserId>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(holder) if !holder.is_empty() => Ok(Some(UserId::from(holder))),
        _ => Ok(None),
    }
}

/// Partial object update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub color: Option<String>,
}

impl ObjectPatch {
    #[must_use]
    pub fn position(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }

    #[must_use]
    pub fn size(width: f64, height: f64) -> Self {
        Self { width: Some(width), height: Some(height), ..Self::default() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.width.is_none() && self.height.is_none() && self.color.is_none()
    }

    /// # Errors
    ///
    /// Returns the first present numeric field that is not finite.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in self.numeric_fields() {
            check_finite(field, value)?;
        }
        Ok(())
    }

    fn numeric_fields(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [("x", self.x), ("y", self.y), ("width", self.width), ("height", self.height)]
            .into_iter()
            .filter_map(|(field, value)| value.map(|v| (field, v)))
    }

    fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        for (field, value) in self.numeric_fields() {
            fields.insert(field.to_owned(), Value::from(value));
        }
        if let Some(color) = &self.color {
            fields.insert("color".to_owned(), Value::from(color.clone()));
        }
        fields
    }
}

/// Every valid object at one point in time, keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectsSnapshot {
    pub objects: BTreeMap<ObjectId, CanvasObject>,
    /// Keys of records that failed decoding or validation.
    pub invalid: Vec<String>,
}

impl ObjectsSnapshot {
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&CanvasObject> {
        self.objects.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanvasObject> {
        self.objects.values()
    }

    fn from_value(value: Option<Value>) -> Self {
        let decoded = decode_children::<CanvasObject>(value);
        let mut snapshot = Self { objects: BTreeMap::new(), invalid: decoded.invalid };
        for (key, object) in decoded.records {
            if key != object.id.to_string() {
                warn!(%key, id = %object.id, "object stored under a foreign key");
                snapshot.invalid.push(key);
                continue;
            }
            if let Err(e) = object.validate() {
                warn!(%key, error = %e, "excluding invalid object");
                snapshot.invalid.push(key);
                continue;
            }
            snapshot.objects.insert(object.id, object);
        }
        snapshot
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field} must be finite, got {value}")]
pub struct ValidationError {
    pub field: &'static str,
    pub value: f64,
}

impl ErrorCode for ValidationError {
    fn error_code(&self) -> &'static str {
        "E_VALIDATION"
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() { Ok(()) } else { Err(ValidationError { field, value }) }
}

#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl ErrorCode for ObjectError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.error_code(),
            Self::Channel(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Channel(e) => e.retryable(),
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

pub struct ObjectStore {
    channel: Arc<dyn SyncChannel>,
}

impl ObjectStore {
    #[must_use]
    pub fn new(channel: Arc<dyn SyncChannel>) -> Self {
        Self { channel }
    }

    /// Validate and write the full record.
    ///
    /// # Errors
    ///
    /// `Validation` before any write, or the channel error.
    pub async fn create(&self, object: &CanvasObject) -> Result<(), ObjectError> {
        object.validate()?;
        let value = serde_json::to_value(object).map_err(ChannelError::from)?;
        self.channel.write(&path::object(object.id), value).await?;
        info!(object_id = %object.id, "object created");
        Ok(())
    }

    /// Validate the present fields, then merge them into the record. An empty
    /// patch writes nothing.
    ///
    /// # Errors
    ///
    /// `Validation` before any write, or the channel error.
    pub async fn update(&self, id: ObjectId, patch: &ObjectPatch) -> Result<(), ObjectError> {
        patch.validate()?;
        if patch.is_empty() {
            return Ok(());
        }
        self.channel.patch(&path::object(id), patch.to_fields()).await?;
        debug!(object_id = %id, "object updated");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the channel error if the erase fails.
    pub async fn remove(&self, id: ObjectId) -> Result<(), ObjectError> {
        self.channel.erase(&path::object(id)).await?;
        info!(object_id = %id, "object removed");
        Ok(())
    }

    /// Unvalidated position write for drag frames.
    ///
    /// # Errors
    ///
    /// Returns the channel error if the patch fails.
    pub async fn update_during_interaction(&self, id: ObjectId, x: f64, y: f64) -> Result<(), ChannelError> {
        let mut fields = Map::new();
        fields.insert("x".to_owned(), Value::from(x));
        fields.insert("y".to_owned(), Value::from(y));
        self.channel.patch(&path::object(id), fields).await
    }

    /// # Errors
    ///
    /// Returns the channel error if the subscription cannot be opened.
    pub async fn subscribe(&self) -> Result<ObjectFeed, ChannelError> {
        let sub = self.channel.subscribe(&path::objects_root()).await?;
        Ok(ObjectFeed { sub })
    }
}

// =============================================================================
// FEED
// =============================================================================

/// Stream of object snapshots. The first snapshot is the state at subscribe
/// time.
#[derive(Debug)]
pub struct ObjectFeed {
    sub: Subscription,
}

impl ObjectFeed {
    /// Next snapshot. `None` once the channel closes.
    pub async fn next(&mut self) -> Option<ObjectsSnapshot> {
        let value = self.sub.recv().await?;
        Some(ObjectsSnapshot::from_value(value))
    }

    pub fn unsubscribe(self) {}
}
