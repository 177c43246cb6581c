//! Toggle broadcast
//!
//! The enabled flag is a single store key. Writers call [`set_enabled`];
//! readers either poll it once with [`read_enabled`] or follow it with
//! [`watch_enabled`]. An absent key reads as enabled.

use crate::error::Result;
use crate::keys::BLOCKING_ENABLED_KEY;
use crate::store::{get_value, set_value, Store, SubscriptionId};
use crate::watch::KeyWatch;

/// Value assumed while the flag has never been written.
pub const DEFAULT_ENABLED: bool = true;

/// Typed watch on the enabled flag in `store`'s namespace.
pub fn enabled_watch<S: Store>(store: &S) -> KeyWatch<bool> {
    KeyWatch::new(store.namespace(), BLOCKING_ENABLED_KEY)
}

pub async fn read_enabled<S: Store>(store: &S) -> Result<bool> {
    Ok(get_value(store, BLOCKING_ENABLED_KEY)
        .await?
        .unwrap_or(DEFAULT_ENABLED))
}

pub async fn set_enabled<S: Store>(store: &S, enabled: bool) -> Result<()> {
    set_value(store, BLOCKING_ENABLED_KEY, &enabled).await?;
    log::info!("Blocking {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

/// Write the default flag if none is stored. Returns the effective value.
///
/// An existing value is left alone, so a user's choice survives restarts of
/// the background surface.
pub async fn ensure_enabled_default<S: Store>(store: &S) -> Result<bool> {
    match get_value::<_, bool>(store, BLOCKING_ENABLED_KEY).await? {
        Some(enabled) => Ok(enabled),
        None => {
            set_enabled(store, DEFAULT_ENABLED).await?;
            Ok(DEFAULT_ENABLED)
        }
    }
}

/// Call `on_change` with the new flag value after every change. A removed
/// key is reported as the default.
pub fn watch_enabled<S, F>(store: &S, on_change: F) -> SubscriptionId
where
    S: Store,
    F: Fn(bool) + 'static,
{
    enabled_watch(store).attach(store, move |change| {
        log::debug!(
            "Enabled flag changed: {:?} -> {:?}",
            change.old_value,
            change.new_value
        );
        on_change(change.new_value.unwrap_or(DEFAULT_ENABLED));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Namespace;
    use futures::executor::block_on;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_absent_flag_reads_enabled() {
        let store = MemoryStore::default();
        assert!(block_on(read_enabled(&store)).unwrap());
    }

    #[test]
    fn test_set_and_read() {
        let store = MemoryStore::default();
        block_on(set_enabled(&store, false)).unwrap();
        assert!(!block_on(read_enabled(&store)).unwrap());
        assert_eq!(store.snapshot().get(BLOCKING_ENABLED_KEY), Some(&json!(false)));
    }

    #[test]
    fn test_default_written_once() {
        let store = MemoryStore::default();
        assert!(block_on(ensure_enabled_default(&store)).unwrap());
        assert!(store.contains_key(BLOCKING_ENABLED_KEY));

        block_on(set_enabled(&store, false)).unwrap();
        assert!(!block_on(ensure_enabled_default(&store)).unwrap());
        assert!(!block_on(read_enabled(&store)).unwrap());
    }

    #[test]
    fn test_watch_enabled() {
        let store = MemoryStore::new(Namespace::Session);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        watch_enabled(&store, move |enabled| sink.borrow_mut().push(enabled));

        block_on(set_enabled(&store, false)).unwrap();
        block_on(set_enabled(&store, false)).unwrap();
        block_on(set_enabled(&store, true)).unwrap();
        block_on(store.remove(&[BLOCKING_ENABLED_KEY])).unwrap();

        assert_eq!(*seen.borrow(), vec![false, true, true]);
    }

    #[test]
    fn test_failed_toggle_keeps_previous_value() {
        let store = MemoryStore::default();
        block_on(set_enabled(&store, true)).unwrap();
        store.fail_writes("quota");
        assert!(block_on(set_enabled(&store, false)).is_err());
        assert!(block_on(read_enabled(&store)).unwrap());
    }
}
