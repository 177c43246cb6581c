//! Background surface
//!
//! The background is the only writer of tab counter entries. Host callbacks
//! (runtime messages, navigation events, tab removal) do not touch the store
//! themselves: they push a [`HostEvent`] through a [`BackgroundHandle`], and a
//! single [`Background`] task applies the events one at a time in arrival
//! order. Two scan results for the same tab can therefore never both read
//! the same stale count.

use futures::channel::{mpsc, oneshot};
use futures::StreamExt;
use serde_json::Value;

use crate::counter::TabCounters;
use crate::error::{Error, Result};
use crate::messages::{Ack, Request};
use crate::store::Store;
use crate::toggle::ensure_enabled_default;
use crate::types::{FrameId, TabId};

// =============================================================================
// Host Events
// =============================================================================

/// Navigation callbacks that report a (possibly) new document URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// `webNavigation.onCompleted`
    Completed,
    /// `webNavigation.onHistoryStateUpdated`
    HistoryStateUpdated,
    /// `webNavigation.onReferenceFragmentUpdated`
    ReferenceFragmentUpdated,
}

/// Event delivered by the host to the background surface.
#[derive(Debug)]
pub enum HostEvent {
    /// Runtime message. `sender_tab` is the tab of the sending content
    /// script, if any.
    Message {
        sender_tab: Option<TabId>,
        payload: Value,
        reply: oneshot::Sender<Ack>,
    },
    Navigation {
        tab_id: TabId,
        frame_id: FrameId,
        url: String,
        kind: NavigationKind,
    },
    TabRemoved {
        tab_id: TabId,
    },
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable sender side of the background event queue.
#[derive(Clone)]
pub struct BackgroundHandle {
    events: mpsc::UnboundedSender<HostEvent>,
}

impl BackgroundHandle {
    /// Deliver a runtime message and wait for its acknowledgement.
    ///
    /// Fails with [`Error::Delivery`] if the background is gone or dropped
    /// the reply because handling failed.
    pub async fn send_message(&self, sender_tab: Option<TabId>, payload: Value) -> Result<Ack> {
        let (reply, response) = oneshot::channel();
        self.push(HostEvent::Message {
            sender_tab,
            payload,
            reply,
        })?;
        response
            .await
            .map_err(|_| Error::delivery("background dropped the reply"))
    }

    /// Queue a runtime message whose reply is delivered on `reply`.
    pub fn post_message(
        &self,
        sender_tab: Option<TabId>,
        payload: Value,
        reply: oneshot::Sender<Ack>,
    ) -> Result<()> {
        self.push(HostEvent::Message {
            sender_tab,
            payload,
            reply,
        })
    }

    pub fn navigation(
        &self,
        tab_id: TabId,
        frame_id: FrameId,
        url: impl Into<String>,
        kind: NavigationKind,
    ) -> Result<()> {
        self.push(HostEvent::Navigation {
            tab_id,
            frame_id,
            url: url.into(),
            kind,
        })
    }

    pub fn tab_removed(&self, tab_id: TabId) -> Result<()> {
        self.push(HostEvent::TabRemoved { tab_id })
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    fn push(&self, event: HostEvent) -> Result<()> {
        self.events
            .unbounded_send(event)
            .map_err(|_| Error::delivery("background is not running"))
    }
}

// =============================================================================
// Background Task
// =============================================================================

/// Single-writer owner of the tab counters.
pub struct Background<S: Store> {
    counters: TabCounters<S>,
    events: mpsc::UnboundedReceiver<HostEvent>,
}

/// Create a background task over `store` and the handle feeding it.
pub fn channel<S: Store>(store: S) -> (Background<S>, BackgroundHandle) {
    let (tx, rx) = mpsc::unbounded();
    (
        Background {
            counters: TabCounters::new(store),
            events: rx,
        },
        BackgroundHandle { events: tx },
    )
}

impl<S: Store> Background<S> {
    pub fn store(&self) -> &S {
        self.counters.store()
    }

    /// Startup work: make sure the enabled flag exists.
    pub async fn init(&self) -> Result<()> {
        let enabled = ensure_enabled_default(self.store()).await?;
        log::info!("Background ready, blocking {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Initialize, then process events until every handle is dropped.
    pub async fn run(mut self) {
        if let Err(e) = self.init().await {
            log::error!("Error initializing background - {}", e);
        }
        while let Some(event) = self.events.next().await {
            self.handle(event).await;
        }
        log::info!("Background event queue closed");
    }

    /// Apply one event. Failures are logged and leave the store as it was.
    pub async fn handle(&mut self, event: HostEvent) {
        match event {
            HostEvent::Message {
                sender_tab,
                payload,
                reply,
            } => {
                if let Some(ack) = self.handle_message(sender_tab, &payload).await {
                    if reply.send(ack).is_err() {
                        log::debug!("Message sender went away before the reply");
                    }
                }
            }
            HostEvent::Navigation {
                tab_id,
                frame_id,
                url,
                kind,
            } => {
                log::debug!("Navigation {:?} in tab {} frame {}: {}", kind, tab_id, frame_id, url);
                if let Err(e) = self.counters.navigate(tab_id, frame_id, &url).await {
                    log::error!("Error handling navigation in tab {} - {}", tab_id, e);
                }
            }
            HostEvent::TabRemoved { tab_id } => {
                if let Err(e) = self.counters.close(tab_id).await {
                    log::error!("Error removing counter for tab {} - {}", tab_id, e);
                }
            }
        }
    }

    /// `None` means handling failed and the reply is withheld, which the
    /// sender observes as a delivery failure.
    async fn handle_message(&mut self, sender_tab: Option<TabId>, payload: &Value) -> Option<Ack> {
        match (Request::from_value(payload), sender_tab) {
            (Request::BlockedOnPage(report), Some(tab_id)) => {
                match self
                    .counters
                    .record_scan(tab_id, &report.hostname, report.num_blocked)
                    .await
                {
                    Ok(entry) => {
                        log::debug!("Tab {} counter now {:?}", tab_id, entry);
                        Some(Ack::Handled)
                    }
                    Err(e) => {
                        log::error!("Error - {}", e);
                        None
                    }
                }
            }
            (Request::BlockedOnPage(_), None) => {
                log::warn!("Scan result without a sender tab");
                Some(Ack::UnknownRequest)
            }
            (Request::Unknown { event }, _) => {
                log::warn!("Unknown request {:?}", event);
                Some(Ack::UnknownRequest)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{blocked_page_key, BLOCKING_ENABLED_KEY};
    use crate::messages::ScanReport;
    use crate::store::MemoryStore;
    use crate::types::{TabCounterEntry, MAIN_FRAME_ID};
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;
    use serde_json::json;
    use std::rc::Rc;

    fn scan(n: u64, host: &str) -> Value {
        ScanReport {
            num_blocked: n,
            hostname: host.to_string(),
        }
        .to_message()
    }

    fn stored(store: &MemoryStore, tab_id: TabId) -> Option<TabCounterEntry> {
        store
            .snapshot()
            .get(&blocked_page_key(tab_id))
            .and_then(TabCounterEntry::from_value)
    }

    /// Runs the background on `store` and drives `script` with its handle.
    fn run_with<F, Fut>(store: Rc<MemoryStore>, script: F)
    where
        F: FnOnce(BackgroundHandle) -> Fut,
        Fut: std::future::Future<Output = ()> + 'static,
    {
        let mut pool = LocalPool::new();
        let (background, handle) = channel(Rc::clone(&store));
        pool.spawner().spawn_local(background.run()).unwrap();
        pool.spawner().spawn_local(script(handle)).unwrap();
        pool.run_until_stalled();
    }

    #[test]
    fn test_example_sequence() {
        let store = Rc::new(MemoryStore::default());
        run_with(Rc::clone(&store), |handle| async move {
            assert_eq!(handle.send_message(Some(7), scan(3, "example.com")).await.unwrap(), Ack::Handled);
            handle.send_message(Some(7), scan(2, "example.com")).await.unwrap();
        });
        assert_eq!(stored(&store, 7), Some(TabCounterEntry::new("example.com", 5)));

        run_with(Rc::clone(&store), |handle| async move {
            handle
                .navigation(7, MAIN_FRAME_ID, "https://other.com/", NavigationKind::Completed)
                .unwrap();
        });
        assert_eq!(stored(&store, 7), Some(TabCounterEntry::new("other.com", 0)));

        run_with(Rc::clone(&store), |handle| async move {
            handle.tab_removed(7).unwrap();
        });
        assert_eq!(stored(&store, 7), None);
    }

    #[test]
    fn test_init_writes_default_flag() {
        let store = Rc::new(MemoryStore::default());
        run_with(Rc::clone(&store), |_| async {});
        assert_eq!(store.snapshot().get(BLOCKING_ENABLED_KEY), Some(&json!(true)));
    }

    #[test]
    fn test_interleaved_senders_lose_nothing() {
        let store = Rc::new(MemoryStore::default().yielding());
        let mut pool = LocalPool::new();
        let (background, handle) = channel(Rc::clone(&store));
        pool.spawner().spawn_local(background.run()).unwrap();

        for sender in 0..8u64 {
            let handle = handle.clone();
            pool.spawner()
                .spawn_local(async move {
                    for i in 1..=10u64 {
                        handle.send_message(Some(1), scan(sender + i, "a.com")).await.unwrap();
                    }
                })
                .unwrap();
        }
        drop(handle);
        pool.run();

        let expected: u64 = (0..8u64).flat_map(|s| (1..=10u64).map(move |i| s + i)).sum();
        assert_eq!(stored(&store, 1), Some(TabCounterEntry::new("a.com", expected)));
    }

    #[test]
    fn test_unknown_request_mutates_nothing() {
        let store = Rc::new(MemoryStore::default());
        run_with(Rc::clone(&store), |handle| async move {
            let ack = handle.send_message(Some(3), json!({"event": "nope"})).await.unwrap();
            assert_eq!(ack.as_str(), "unknown request");
            let ack = handle.send_message(None, scan(1, "a.com")).await.unwrap();
            assert_eq!(ack, Ack::UnknownRequest);
        });
        assert_eq!(store.len(), 1);
        assert!(store.contains_key(BLOCKING_ENABLED_KEY));
    }

    #[test]
    fn test_store_failure_is_a_delivery_error() {
        let store = Rc::new(MemoryStore::default());
        run_with(Rc::clone(&store), |handle| async move {
            handle.send_message(Some(4), scan(2, "a.com")).await.unwrap();
        });
        store.fail_writes("quota");
        run_with(Rc::clone(&store), |handle| async move {
            let err = handle.send_message(Some(4), scan(2, "a.com")).await.unwrap_err();
            assert!(matches!(err, Error::Delivery { .. }));
        });
        assert_eq!(stored(&store, 4), Some(TabCounterEntry::new("a.com", 2)));
    }

    #[test]
    fn test_handle_after_shutdown() {
        let (background, handle) = channel(MemoryStore::default());
        drop(background);
        assert!(handle.is_closed());
        assert!(matches!(handle.tab_removed(1), Err(Error::Delivery { .. })));
    }
}
