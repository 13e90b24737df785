use serde_json::{Map, Value};
use tokio::time::{Duration, timeout};

use super::*;
use crate::channel::memory::{MemoryChannel, MemoryStore};
use crate::channel::{Path, TransactFn, TransactOutcome};

async fn next_list(feed: &mut PresenceFeed) -> Vec<PresenceRecord> {
    timeout(Duration::from_millis(200), feed.next())
        .await
        .expect("presence feed timed out")
        .expect("presence feed closed")
}

/// Read lists until one satisfies `pred`.
async fn wait_for(feed: &mut PresenceFeed, pred: impl Fn(&[PresenceRecord]) -> bool) -> Vec<PresenceRecord> {
    loop {
        let list = next_list(feed).await;
        if pred(&list) {
            return list;
        }
    }
}

fn contains(list: &[PresenceRecord], user_id: &UserId) -> bool {
    list.iter().any(|r| &r.user_id == user_id)
}

/// Memory channel whose disconnect hooks can never be registered.
struct HooklessChannel(MemoryChannel);

#[async_trait::async_trait]
impl SyncChannel for HooklessChannel {
    async fn write(&self, path: &Path, value: Value) -> Result<(), ChannelError> {
        self.0.write(path, value).await
    }
    async fn patch(&self, path: &Path, fields: Map<String, Value>) -> Result<(), ChannelError> {
        self.0.patch(path, fields).await
    }
    async fn erase(&self, path: &Path) -> Result<(), ChannelError> {
        self.0.erase(path).await
    }
    async fn subscribe(&self, path: &Path) -> Result<Subscription, ChannelError> {
        self.0.subscribe(path).await
    }
    async fn transact(&self, path: &Path, update: TransactFn) -> Result<TransactOutcome, ChannelError> {
        self.0.transact(path, update).await
    }
    async fn on_disconnect_erase(&self, _path: &Path) -> Result<(), ChannelError> {
        Err(ChannelError::Transport("hooks unavailable".into()))
    }
    async fn cancel_on_disconnect(&self, path: &Path) -> Result<(), ChannelError> {
        self.0.cancel_on_disconnect(path).await
    }
}

#[tokio::test]
async fn join_writes_record_and_registers_hook_once() {
    let store = MemoryStore::new();
    let ch = Arc::new(store.connect());
    let tracker = PresenceTracker::new(ch.clone());
    let ada = Identity::new("Ada");

    tracker.join(&ada).await.unwrap();
    tracker.join(&ada).await.unwrap();

    let stored: PresenceRecord = serde_json::from_value(store.value_at(&path::presence(&ada.id)).unwrap()).unwrap();
    assert_eq!(stored, PresenceRecord::from(&ada));
    assert_eq!(ch.stats().hook_registrations, 1);
    assert_eq!(ch.registered_hooks(), vec![path::presence(&ada.id)]);
}

#[tokio::test]
async fn failed_write_leaves_no_hook() {
    let store = MemoryStore::new();
    store.deny_writes(path::presence_root());
    let ch = Arc::new(store.connect());
    let tracker = PresenceTracker::new(ch.clone());

    let err = tracker.join(&Identity::new("Ada")).await.unwrap_err();
    assert!(matches!(err, ChannelError::PermissionDenied(_)));
    assert_eq!(ch.stats().hook_registrations, 0);
    assert!(ch.registered_hooks().is_empty());
}

#[tokio::test]
async fn failed_hook_registration_rolls_back_record() {
    let store = MemoryStore::new();
    let tracker = PresenceTracker::new(Arc::new(HooklessChannel(store.connect())));
    let ada = Identity::new("Ada");

    let err = tracker.join(&ada).await.unwrap_err();
    assert!(matches!(err, ChannelError::Transport(_)));
    assert_eq!(store.value_at(&path::presence(&ada.id)), None);
}

#[tokio::test]
async fn empty_store_yields_empty_list() {
    let store = MemoryStore::new();
    let tracker = PresenceTracker::new(Arc::new(store.connect()));
    let mut feed = tracker.subscribe().await.unwrap();
    assert!(next_list(&mut feed).await.is_empty());
}

#[tokio::test]
async fn leave_removes_record_and_cancels_hook() {
    let store = MemoryStore::new();
    let ch = Arc::new(store.connect());
    let tracker = PresenceTracker::new(ch.clone());
    let ada = Identity::new("Ada");

    tracker.join(&ada).await.unwrap();
    tracker.leave(&ada.id).await.unwrap();

    assert_eq!(store.value_at(&path::presence(&ada.id)), None);
    assert!(ch.registered_hooks().is_empty());
    assert_eq!(ch.stats().hook_cancellations, 1);
}

#[tokio::test]
async fn peers_converge_on_join_and_disconnect() {
    let store = MemoryStore::new();
    let a_channel = Arc::new(store.connect());
    let a = PresenceTracker::new(a_channel.clone());
    let b = PresenceTracker::new(Arc::new(store.connect()));
    let ada = Identity::new("Ada");

    a.join(&ada).await.unwrap();
    let mut feed = b.subscribe().await.unwrap();
    let list = wait_for(&mut feed, |l| contains(l, &ada.id)).await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].display_name, "Ada");

    a_channel.disconnect();
    let list = wait_for(&mut feed, |l| !contains(l, &ada.id)).await;
    assert!(list.is_empty());
}

#[tokio::test]
async fn peers_converge_on_explicit_leave() {
    let store = MemoryStore::new();
    let a = PresenceTracker::new(Arc::new(store.connect()));
    let b = PresenceTracker::new(Arc::new(store.connect()));
    let ada = Identity::new("Ada");
    let bob = Identity::new("Bob");

    b.join(&bob).await.unwrap();
    a.join(&ada).await.unwrap();
    let mut feed = b.subscribe().await.unwrap();
    wait_for(&mut feed, |l| contains(l, &ada.id) && contains(l, &bob.id)).await;

    a.leave(&ada.id).await.unwrap();
    let list = wait_for(&mut feed, |l| !contains(l, &ada.id)).await;
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].user_id, bob.id);
}
