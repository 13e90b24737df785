//! Sync Channel — the shared real-time key-value store contract.
//!
//! ARCHITECTURE
//! ============
//! Every cross-client effect in this crate goes through [`SyncChannel`]:
//! path-addressed JSON values, subscriptions that deliver the current value
//! immediately and then on every change, atomic per-path transactions, and
//! server-held erase hooks that fire when this client's transport drops.
//!
//! Ordering is only guaranteed per path: a subscription sees the changes to
//! its path in the order the store applied them. Nothing is promised about
//! relative order across different paths.
//!
//! Subscriptions hold the latest value only. A reader that falls behind skips
//! the intermediate values and receives the newest one; memory per
//! subscription stays constant however fast the path changes.
//!
//! [`memory`] is the in-process implementation used by tests and local
//! embedding. Any store with the same primitives can back the trait.

pub mod memory;
pub mod path;

pub use path::Path;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::error::ErrorCode;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("transport disconnected")]
    Disconnected,
    #[error("permission denied at {0}")]
    PermissionDenied(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ErrorCode for ChannelError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Disconnected => "E_CHANNEL_DISCONNECTED",
            Self::PermissionDenied(_) => "E_CHANNEL_PERMISSION",
            Self::InvalidPath(_) => "E_CHANNEL_PATH",
            Self::Transport(_) => "E_CHANNEL_TRANSPORT",
            Self::Encode(_) => "E_CHANNEL_ENCODE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Transport(_))
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// What a transaction update function wants done with the current value.
#[derive(Debug, Clone, PartialEq)]
pub enum Transaction {
    /// Replace the value. `Value::Null` erases it.
    Set(Value),
    /// Leave the value untouched and report failure.
    Abort,
}

/// Result of [`SyncChannel::transact`]. Both arms carry the value at the path
/// after the transaction resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactOutcome {
    Committed(Option<Value>),
    Aborted(Option<Value>),
}

impl TransactOutcome {
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Committed(v) | Self::Aborted(v) => v.as_ref(),
        }
    }
}

/// Update function for [`SyncChannel::transact`]. Receives the current value
/// (`None` when absent). Remote stores may call it more than once.
pub type TransactFn = Box<dyn FnMut(Option<&Value>) -> Transaction + Send>;

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

/// Live view of one path. The first item is the value at subscribe time (or
/// a newer one, if the path changed before the first read).
///
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    rx: watch::Receiver<Option<Value>>,
    /// The value the receiver was created with has not been read yet.
    initial_pending: bool,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a watch receiver whose current value is the state at subscribe
    /// time. The sender side publishes every later change.
    pub fn new(rx: watch::Receiver<Option<Value>>, on_drop: impl FnOnce() + Send + 'static) -> Self {
        Self { rx, initial_pending: true, on_drop: Some(Box::new(on_drop)) }
    }

    /// Next value at the path, skipping any the reader was too slow to see.
    /// `None` once the channel has closed the subscription (e.g. after
    /// disconnect).
    pub async fn recv(&mut self) -> Option<Option<Value>> {
        if std::mem::take(&mut self.initial_pending) {
            return Some(self.rx.borrow_and_update().clone());
        }
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// Newest unread value, if the path changed since the last read. Does
    /// not wait.
    pub fn try_latest(&mut self) -> Option<Option<Value>> {
        let unread = std::mem::take(&mut self.initial_pending) || matches!(self.rx.has_changed(), Ok(true));
        unread.then(|| self.rx.borrow_and_update().clone())
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// =============================================================================
// DECODING
// =============================================================================

/// Children of a keyed collection, split into records that decoded and the
/// keys of those that did not.
#[derive(Debug)]
pub struct Decoded<T> {
    pub records: Vec<(String, T)>,
    pub invalid: Vec<String>,
}

/// Decode every child of a collection value (`presence`, `cursors`, ...).
/// An absent or non-object value is an empty collection.
#[must_use]
pub fn decode_children<T: DeserializeOwned>(value: Option<Value>) -> Decoded<T> {
    let mut decoded = Decoded { records: Vec::new(), invalid: Vec::new() };
    let Some(Value::Object(map)) = value else {
        return decoded;
    };
    for (key, child) in map {
        match serde_json::from_value::<T>(child) {
            Ok(record) => decoded.records.push((key, record)),
            Err(e) => {
                tracing::warn!(%key, error = %e, "skipping undecodable record");
                decoded.invalid.push(key);
            }
        }
    }
    decoded
}

// =============================================================================
// CONTRACT
// =============================================================================

/// The shared store as seen by one client connection.
#[async_trait::async_trait]
pub trait SyncChannel: Send + Sync {
    /// Replace the value at `path`. Writing `Value::Null` erases.
    async fn write(&self, path: &Path, value: Value) -> Result<(), ChannelError>;

    /// Merge `fields` into the object at `path` without touching siblings.
    /// A `null` field removes that key.
    async fn patch(&self, path: &Path, fields: Map<String, Value>) -> Result<(), ChannelError>;

    /// Remove the value at `path` and everything below it.
    async fn erase(&self, path: &Path) -> Result<(), ChannelError>;

    /// Watch `path`. Delivers the current value first, then every change.
    async fn subscribe(&self, path: &Path) -> Result<Subscription, ChannelError>;

    /// Apply `update` atomically relative to every other transaction on `path`.
    async fn transact(&self, path: &Path, update: TransactFn) -> Result<TransactOutcome, ChannelError>;

    /// Register a server-held erase of `path`, fired once if this connection
    /// drops before the hook is cancelled.
    async fn on_disconnect_erase(&self, path: &Path) -> Result<(), ChannelError>;

    /// Remove a hook registered with [`SyncChannel::on_disconnect_erase`].
    /// Cancelling an unknown hook is not an error.
    async fn cancel_on_disconnect(&self, path: &Path) -> Result<(), ChannelError>;
}
