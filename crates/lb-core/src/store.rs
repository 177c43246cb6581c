//! Key-value store abstraction
//!
//! The [`Store`] trait mirrors the host storage area: partial `get`, `set`
//! and `remove` round-trips plus a change-notification stream. Every surface
//! is a single-threaded event loop, so the futures carry no `Send` bound and
//! listeners are plain `Fn` closures.
//!
//! [`MemoryStore`] is the in-process implementation used by the CLI and the
//! tests. It emits exactly the notifications the browser would: one
//! [`ChangeSet`] per mutation, listing only keys whose value changed.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{ChangeSet, Namespace, StorageChange, StoreMap};

// =============================================================================
// Store Trait
// =============================================================================

/// Callback invoked with every change set the store publishes.
pub type ChangeListener = Box<dyn Fn(Namespace, &ChangeSet)>;

/// Handle returned by [`Store::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Namespaced, change-observable key-value store.
#[allow(async_fn_in_trait)]
pub trait Store {
    /// Storage area this instance reads and writes.
    fn namespace(&self) -> Namespace;

    /// Fetch the given keys. Absent keys are missing from the result.
    async fn get(&self, keys: &[&str]) -> Result<StoreMap>;

    /// Write every entry of `items`.
    async fn set(&self, items: StoreMap) -> Result<()>;

    /// Delete the given keys. Absent keys are ignored.
    async fn remove(&self, keys: &[&str]) -> Result<()>;

    /// Register a listener for change notifications.
    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId;

    /// Drop a listener. Returns `false` if it was not registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

impl<S: Store> Store for Rc<S> {
    fn namespace(&self) -> Namespace {
        (**self).namespace()
    }

    async fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        (**self).get(keys).await
    }

    async fn set(&self, items: StoreMap) -> Result<()> {
        (**self).set(items).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        (**self).remove(keys).await
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        (**self).subscribe(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        (**self).unsubscribe(id)
    }
}

// =============================================================================
// Typed Helpers
// =============================================================================

/// Read and decode one key.
pub async fn get_value<S: Store, T: DeserializeOwned>(store: &S, key: &str) -> Result<Option<T>> {
    let mut items = store.get(&[key]).await?;
    match items.remove(key) {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encode and write one key.
pub async fn set_value<S: Store, T: Serialize>(store: &S, key: &str, value: &T) -> Result<()> {
    let mut items = StoreMap::new();
    items.insert(key.to_string(), serde_json::to_value(value)?);
    store.set(items).await
}

// =============================================================================
// Memory Store
// =============================================================================

struct MemoryInner {
    data: BTreeMap<String, Value>,
    listeners: BTreeMap<SubscriptionId, Rc<dyn Fn(Namespace, &ChangeSet)>>,
    next_subscription: u64,
    write_failure: Option<String>,
    quota_bytes: Option<usize>,
}

/// In-process store with browser-compatible change notifications.
pub struct MemoryStore {
    namespace: Namespace,
    inner: RefCell<MemoryInner>,
    #[cfg_attr(target_arch = "wasm32", allow(dead_code))]
    yield_ops: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Namespace::Local)
    }
}

impl MemoryStore {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            inner: RefCell::new(MemoryInner {
                data: BTreeMap::new(),
                listeners: BTreeMap::new(),
                next_subscription: 0,
                write_failure: None,
                quota_bytes: None,
            }),
            yield_ops: false,
        }
    }

    /// Suspend once before every operation, like a host round-trip would.
    /// Lets concurrently running tasks interleave between reads and writes.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn yielding(mut self) -> Self {
        self.yield_ops = true;
        self
    }

    /// Reject writes whose total encoded size would exceed `bytes`.
    pub fn with_quota(self, bytes: usize) -> Self {
        self.inner.borrow_mut().quota_bytes = Some(bytes);
        self
    }

    /// Make every subsequent `set`/`remove` fail with a store error.
    pub fn fail_writes(&self, message: impl Into<String>) {
        self.inner.borrow_mut().write_failure = Some(message.into());
    }

    pub fn clear_failures(&self) {
        self.inner.borrow_mut().write_failure = None;
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> StoreMap {
        self.inner
            .borrow()
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.borrow().data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn round_trip(&self) {
        #[cfg(not(target_arch = "wasm32"))]
        if self.yield_ops {
            tokio::task::yield_now().await;
        }
    }

    fn check_writable(inner: &MemoryInner) -> Result<()> {
        match &inner.write_failure {
            Some(message) => Err(Error::store(message.clone())),
            None => Ok(()),
        }
    }

    fn encoded_size(data: &BTreeMap<String, Value>) -> usize {
        data.iter().map(|(k, v)| k.len() + v.to_string().len()).sum()
    }

    fn publish(&self, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }
        // Listeners may subscribe or unsubscribe while being notified
        let listeners: Vec<_> = self.inner.borrow().listeners.values().cloned().collect();
        for listener in listeners {
            listener(self.namespace, &changes);
        }
    }
}

impl Store for MemoryStore {
    fn namespace(&self) -> Namespace {
        self.namespace
    }

    async fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        self.round_trip().await;
        let inner = self.inner.borrow();
        Ok(keys
            .iter()
            .filter_map(|key| inner.data.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, items: StoreMap) -> Result<()> {
        self.round_trip().await;
        let changes = {
            let mut inner = self.inner.borrow_mut();
            Self::check_writable(&inner)?;

            if let Some(quota) = inner.quota_bytes {
                let mut projected = inner.data.clone();
                projected.extend(items.iter().map(|(k, v)| (k.clone(), v.clone())));
                if Self::encoded_size(&projected) > quota {
                    return Err(Error::QuotaExceeded);
                }
            }

            let mut changes = ChangeSet::new();
            for (key, value) in items {
                let old_value = inner.data.insert(key.clone(), value.clone());
                if old_value.as_ref() != Some(&value) {
                    changes.insert(
                        key,
                        StorageChange {
                            old_value,
                            new_value: Some(value),
                        },
                    );
                }
            }
            changes
        };
        self.publish(changes);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        self.round_trip().await;
        let changes = {
            let mut inner = self.inner.borrow_mut();
            Self::check_writable(&inner)?;

            let mut changes = ChangeSet::new();
            for key in keys {
                if let Some(old_value) = inner.data.remove(*key) {
                    changes.insert(
                        key.to_string(),
                        StorageChange {
                            old_value: Some(old_value),
                            new_value: None,
                        },
                    );
                }
            }
            changes
        };
        self.publish(changes);
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;
        inner.listeners.insert(id, Rc::from(listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.borrow_mut().listeners.remove(&id).is_some()
    }
}
