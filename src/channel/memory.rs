//! In-process Sync Channel backed by a shared JSON tree.
//!
//! DESIGN
//! ======
//! A [`MemoryStore`] is the "server": one JSON tree, the subscription
//! watchers, and the disconnect hooks of every connection, all behind a
//! single std mutex. Each client talks to it through its own
//! [`MemoryChannel`]. Every operation runs to completion under the lock, so
//! transactions on the same path are applied in a serial order with exactly
//! one winner, and watchers receive changes in apply order. Each watcher is a
//! `tokio::sync::watch` slot holding the newest value, so a slow subscriber
//! costs one value, not a backlog.
//!
//! Store semantics follow the usual real-time-database rules: `null` is
//! absence, writing `null` erases, and objects left empty by an erase are
//! pruned up the tree.
//!
//! `disconnect()` models transport loss: it fires this connection's hooks
//! once, ends its subscriptions, and makes every later call fail with
//! `Disconnected`. Dropping a `MemoryChannel` disconnects it.

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ChannelError, Path, Subscription, SyncChannel, TransactFn, TransactOutcome, Transaction};

// =============================================================================
// TYPES
// =============================================================================

/// Per-connection operation counters, for asserting wire behavior in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// `write`, `patch` and `erase` calls that reached the tree.
    pub writes: usize,
    /// `transact` calls, committed or aborted.
    pub transactions: usize,
    /// `on_disconnect_erase` calls, including repeats for the same path.
    pub hook_registrations: usize,
    pub hook_cancellations: usize,
}

struct Watcher {
    connection: Uuid,
    path: Path,
    tx: watch::Sender<Option<Value>>,
}

struct Connection {
    connected: bool,
    hooks: BTreeSet<Path>,
    stats: ChannelStats,
}

struct StoreInner {
    root: Value,
    watchers: HashMap<u64, Watcher>,
    connections: HashMap<Uuid, Connection>,
    denied: Vec<Path>,
    next_watcher: u64,
}

/// The shared tree. Clone is cheap; clones refer to the same store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

/// One client's connection to a [`MemoryStore`].
pub struct MemoryChannel {
    store: MemoryStore,
    id: Uuid,
}

fn lock(inner: &Mutex<StoreInner>) -> MutexGuard<'_, StoreInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// STORE
// =============================================================================

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                root: Value::Object(Map::new()),
                watchers: HashMap::new(),
                connections: HashMap::new(),
                denied: Vec::new(),
                next_watcher: 0,
            })),
        }
    }

    /// Open a new client connection.
    #[must_use]
    pub fn connect(&self) -> MemoryChannel {
        let id = Uuid::new_v4();
        lock(&self.inner)
            .connections
            .insert(id, Connection { connected: true, hooks: BTreeSet::new(), stats: ChannelStats::default() });
        debug!(connection = %id, "memory channel connected");
        MemoryChannel { store: self.clone(), id }
    }

    /// Reject client writes at or below `prefix`, like a security rule would.
    /// Disconnect hooks are server-held and still fire.
    pub fn deny_writes(&self, prefix: Path) {
        lock(&self.inner).denied.push(prefix);
    }

    /// Drop every rule added with [`MemoryStore::deny_writes`].
    pub fn allow_all(&self) {
        lock(&self.inner).denied.clear();
    }

    /// Current value at `path`, read directly from the tree.
    #[must_use]
    pub fn value_at(&self, path: &Path) -> Option<Value> {
        get(&lock(&self.inner).root, path).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreInner {
    fn connection(&mut self, id: Uuid) -> Result<&mut Connection, ChannelError> {
        match self.connections.get_mut(&id) {
            Some(conn) if conn.connected => Ok(conn),
            _ => Err(ChannelError::Disconnected),
        }
    }

    fn check_writable(&self, path: &Path) -> Result<(), ChannelError> {
        if self.denied.iter().any(|rule| rule.is_prefix_of(path)) {
            return Err(ChannelError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    /// Set or erase at `path` and notify overlapping watchers.
    fn apply(&mut self, path: &Path, value: Option<Value>) {
        match value.and_then(normalize) {
            Some(value) => set(&mut self.root, path.segments(), value),
            None => {
                erase(&mut self.root, path.segments());
            }
        }
        self.notify(path);
    }

    fn notify(&mut self, changed: &Path) {
        let root = &self.root;
        self.watchers.retain(|_, watcher| {
            if !watcher.path.overlaps(changed) {
                return true;
            }
            // A closed receiver means the subscriber went away.
            if watcher.tx.is_closed() {
                return false;
            }
            watcher.tx.send_replace(get(root, &watcher.path).cloned());
            true
        });
    }
}

// =============================================================================
// CHANNEL
// =============================================================================

impl MemoryChannel {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock(&self.store.inner)
            .connections
            .get(&self.id)
            .is_some_and(|c| c.connected)
    }

    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        lock(&self.store.inner)
            .connections
            .get(&self.id)
            .map(|c| c.stats)
            .unwrap_or_default()
    }

    /// Paths with a live disconnect hook on this connection.
    #[must_use]
    pub fn registered_hooks(&self) -> Vec<Path> {
        lock(&self.store.inner)
            .connections
            .get(&self.id)
            .map(|c| c.hooks.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Simulate transport loss. Fires the registered hooks exactly once.
    pub fn disconnect(&self) {
        let mut inner = lock(&self.store.inner);
        let hooks = match inner.connections.get_mut(&self.id) {
            Some(conn) if conn.connected => {
                conn.connected = false;
                std::mem::take(&mut conn.hooks)
            }
            _ => return,
        };

        let id = self.id;
        inner.watchers.retain(|_, w| w.connection != id);
        let fired = hooks.len();
        for path in hooks {
            inner.apply(&path, None);
        }
        info!(connection = %id, fired, "memory channel disconnected");
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[async_trait::async_trait]
impl SyncChannel for MemoryChannel {
    async fn write(&self, path: &Path, value: Value) -> Result<(), ChannelError> {
        let mut inner = lock(&self.store.inner);
        inner.connection(self.id)?;
        inner.check_writable(path)?;
        inner.apply(path, Some(value));
        inner.connection(self.id)?.stats.writes += 1;
        Ok(())
    }

    async fn patch(&self, path: &Path, fields: Map<String, Value>) -> Result<(), ChannelError> {
        let mut inner = lock(&self.store.inner);
        inner.connection(self.id)?;
        inner.check_writable(path)?;
        for (key, value) in fields {
            let child = path.child(key);
            match normalize(value) {
                Some(value) => set(&mut inner.root, child.segments(), value),
                None => {
                    erase(&mut inner.root, child.segments());
                }
            }
        }
        inner.notify(path);
        inner.connection(self.id)?.stats.writes += 1;
        Ok(())
    }

    async fn erase(&self, path: &Path) -> Result<(), ChannelError> {
        let mut inner = lock(&self.store.inner);
        inner.connection(self.id)?;
        inner.check_writable(path)?;
        inner.apply(path, None);
        inner.connection(self.id)?.stats.writes += 1;
        Ok(())
    }

    async fn subscribe(&self, path: &Path) -> Result<Subscription, ChannelError> {
        let mut inner = lock(&self.store.inner);
        inner.connection(self.id)?;

        let (tx, rx) = watch::channel(get(&inner.root, path).cloned());

        let watcher_id = inner.next_watcher;
        inner.next_watcher += 1;
        inner
            .watchers
            .insert(watcher_id, Watcher { connection: self.id, path: path.clone(), tx });

        let weak: Weak<Mutex<StoreInner>> = Arc::downgrade(&self.store.inner);
        Ok(Subscription::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).watchers.remove(&watcher_id);
            }
        }))
    }

    async fn transact(&self, path: &Path, mut update: TransactFn) -> Result<TransactOutcome, ChannelError> {
        let mut inner = lock(&self.store.inner);
        inner.connection(self.id)?.stats.transactions += 1;
        inner.check_writable(path)?;

        let current = get(&inner.root, path).cloned();
        match update(current.as_ref()) {
            Transaction::Set(value) => {
                inner.apply(path, Some(value));
                Ok(TransactOutcome::Committed(get(&inner.root, path).cloned()))
            }
            Transaction::Abort => Ok(TransactOutcome::Aborted(current)),
        }
    }

    async fn on_disconnect_erase(&self, path: &Path) -> Result<(), ChannelError> {
        let mut inner = lock(&self.store.inner);
        let conn = inner.connection(self.id)?;
        conn.stats.hook_registrations += 1;
        conn.hooks.insert(path.clone());
        Ok(())
    }

    async fn cancel_on_disconnect(&self, path: &Path) -> Result<(), ChannelError> {
        let mut inner = lock(&self.store.inner);
        let conn = inner.connection(self.id)?;
        conn.stats.hook_cancellations += 1;
        conn.hooks.remove(path);
        Ok(())
    }
}

// =============================================================================
// TREE HELPERS
// =============================================================================

fn get<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

fn set(node: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.clone()).or_insert(Value::Null);
        set(child, rest, value);
    }
}

/// Remove the value at `segments`. Returns true when `node` itself ended up
/// empty and should be pruned by the caller.
fn erase(node: &mut Value, segments: &[String]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        *node = Value::Object(Map::new());
        return true;
    };
    let Value::Object(map) = node else {
        return false;
    };
    if rest.is_empty() {
        map.remove(first);
    } else if let Some(child) = map.get_mut(first) {
        if erase(child, rest) {
            map.remove(first);
        }
    }
    map.is_empty()
}

/// Strip nulls and empty objects. `None` means the whole value is absent.
fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k, v)))
                .collect();
            if map.is_empty() { None } else { Some(Value::Object(map)) }
        }
        other => Some(other),
    }
}
