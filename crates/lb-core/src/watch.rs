//! Typed per-key subscriptions on top of store change notifications.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::store::{Store, SubscriptionId};
use crate::types::{ChangeSet, Namespace};

/// Decoded old/new value of a watched key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedChange<T> {
    pub old_value: Option<T>,
    pub new_value: Option<T>,
}

/// Filters change sets down to one key in one namespace and decodes it.
pub struct KeyWatch<T> {
    namespace: Namespace,
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for KeyWatch<T> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace,
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned + 'static> KeyWatch<T> {
    pub fn new(namespace: Namespace, key: impl Into<String>) -> Self {
        Self {
            namespace,
            key: key.into(),
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// The change to the watched key, if `changes` contains one for this
    /// namespace. Values that fail to decode are reported as `None`.
    pub fn extract(&self, namespace: Namespace, changes: &ChangeSet) -> Option<TypedChange<T>> {
        if namespace != self.namespace {
            return None;
        }
        let change = changes.get(&self.key)?;
        Some(TypedChange {
            old_value: self.decode(change.old_value.as_ref()),
            new_value: self.decode(change.new_value.as_ref()),
        })
    }

    /// Subscribe `callback` to changes of the watched key.
    pub fn attach<S, F>(self, store: &S, callback: F) -> SubscriptionId
    where
        S: Store,
        F: Fn(TypedChange<T>) + 'static,
    {
        store.subscribe(Box::new(move |namespace, changes| {
            if let Some(change) = self.extract(namespace, changes) {
                callback(change);
            }
        }))
    }

    fn decode(&self, value: Option<&Value>) -> Option<T> {
        let value = value?;
        match serde_json::from_value(value.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                log::warn!("Ignoring undecodable value for '{}': {}", self.key, e);
                None
            }
        }
    }
}
