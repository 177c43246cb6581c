//! Tab counter protocol
//!
//! Each open tab that has reported at least one scan owns one
//! [`TabCounterEntry`] in the store. Per tab:
//!
//! ```text
//! Absent        --scan(h, d)-------------------> Active(h, d)
//! Active(h, c)  --scan(h, d)-------------------> Active(h, c + d)
//! Active(h, c)  --top-level navigation to h2---> Active(h2, 0)    (h2 != h)
//! Active(_, _)  --tab closed-------------------> Absent
//! ```
//!
//! The transition functions are pure. [`TabCounters`] applies them against
//! the store; it takes `&mut self` for every mutation, so whoever owns it is
//! the single writer and each read-modify-write finishes before the next one
//! starts.
//!
//! Scan results can still be in flight when the navigation event for the
//! next page arrives. [`TabCounters`] remembers the hosts a tab navigated
//! away from and drops scans naming them until a scan from a current page
//! is accepted.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::keys::blocked_page_key;
use crate::store::Store;
use crate::types::{FrameId, StoreMap, TabCounterEntry, TabId, MAIN_FRAME_ID};
use crate::url::{hostname, normalize_host};

// =============================================================================
// Transitions
// =============================================================================

/// Store effect of one protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterUpdate {
    /// Write this entry.
    Write(TabCounterEntry),
    /// Delete the tab's entry.
    Delete,
    /// Leave the store as it is.
    Unchanged,
}

/// Apply a scan result of `delta` substitutions reported from `host`.
///
/// `stale` marks `host` as one the tab has navigated away from; such a
/// scan is a late message from an earlier page and is dropped, so the last
/// navigation decides the hostname.
pub fn on_scan(prev: Option<&TabCounterEntry>, stale: bool, host: &str, delta: u64) -> CounterUpdate {
    match prev {
        Some(entry) if entry.hostname == host => CounterUpdate::Write(TabCounterEntry::new(
            host,
            entry.num_blocked.saturating_add(delta),
        )),
        Some(_) if stale => CounterUpdate::Unchanged,
        _ => CounterUpdate::Write(TabCounterEntry::new(host, delta)),
    }
}

/// Apply a navigation of frame `frame_id` to a document on `host`.
pub fn on_navigation(prev: Option<&TabCounterEntry>, frame_id: FrameId, host: &str) -> CounterUpdate {
    if frame_id != MAIN_FRAME_ID {
        return CounterUpdate::Unchanged;
    }
    match prev {
        Some(entry) if entry.hostname != host => CounterUpdate::Write(TabCounterEntry::new(host, 0)),
        _ => CounterUpdate::Unchanged,
    }
}

/// Apply a tab close.
pub fn on_close(prev: Option<&TabCounterEntry>) -> CounterUpdate {
    match prev {
        Some(_) => CounterUpdate::Delete,
        None => CounterUpdate::Unchanged,
    }
}

// =============================================================================
// Store-backed Counters
// =============================================================================

/// Owner of every tab counter entry in a store.
pub struct TabCounters<S: Store> {
    store: S,
    /// Hosts each tab navigated away from since its last accepted scan.
    departed: HashMap<TabId, HashSet<String>>,
}

impl<S: Store> TabCounters<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            departed: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current entry for `tab_id`. Undecodable values read as absent.
    pub async fn entry(&self, tab_id: TabId) -> Result<Option<TabCounterEntry>> {
        let key = blocked_page_key(tab_id);
        let mut items = self.store.get(&[key.as_str()]).await?;
        Ok(items.remove(&key).and_then(|value| {
            let entry = TabCounterEntry::from_value(&value);
            if entry.is_none() {
                log::warn!("Discarding malformed counter for tab {}: {}", tab_id, value);
            }
            entry
        }))
    }

    fn is_departed(&self, tab_id: TabId, host: &str) -> bool {
        self.departed
            .get(&tab_id)
            .map_or(false, |hosts| hosts.contains(host))
    }

    /// Add `delta` substitutions reported for `host` in `tab_id`.
    /// Returns the entry as stored afterwards.
    pub async fn record_scan(
        &mut self,
        tab_id: TabId,
        host: &str,
        delta: u64,
    ) -> Result<Option<TabCounterEntry>> {
        let host = normalize_host(host);
        let prev = self.entry(tab_id).await?;
        let update = on_scan(prev.as_ref(), self.is_departed(tab_id, &host), &host, delta);

        if update == CounterUpdate::Unchanged {
            log::debug!("Dropping late scan for tab {} from departed host {}", tab_id, host);
            return Ok(prev);
        }

        self.commit(tab_id, update).await?;
        // A page loaded after the last navigation has reported.
        self.departed.remove(&tab_id);
        self.entry(tab_id).await
    }

    /// Handle a navigation event. URLs without a host are ignored.
    pub async fn navigate(&mut self, tab_id: TabId, frame_id: FrameId, url: &str) -> Result<()> {
        if frame_id != MAIN_FRAME_ID {
            return Ok(());
        }
        let Some(host) = hostname(url) else {
            log::debug!("Ignoring navigation without hostname in tab {}: {}", tab_id, url);
            return Ok(());
        };

        let prev = self.entry(tab_id).await?;
        let update = on_navigation(prev.as_ref(), frame_id, &host);
        let switched = match (&prev, &update) {
            (Some(prev), CounterUpdate::Write(_)) => Some(prev.hostname.clone()),
            _ => None,
        };
        self.commit(tab_id, update).await?;

        if let Some(previous) = switched {
            log::debug!("Tab {} switched host {} -> {}", tab_id, previous, host);
            let departed = self.departed.entry(tab_id).or_default();
            if !previous.is_empty() {
                departed.insert(previous);
            }
            departed.remove(&host);
        }
        Ok(())
    }

    /// Handle a tab close: the entry is deleted, not archived.
    pub async fn close(&mut self, tab_id: TabId) -> Result<()> {
        let prev = self.entry(tab_id).await?;
        self.commit(tab_id, on_close(prev.as_ref())).await?;
        self.departed.remove(&tab_id);
        Ok(())
    }

    async fn commit(&self, tab_id: TabId, update: CounterUpdate) -> Result<()> {
        let key = blocked_page_key(tab_id);
        match update {
            CounterUpdate::Write(entry) => {
                let mut items = StoreMap::new();
                items.insert(key, entry.to_value());
                self.store.set(items).await
            }
            CounterUpdate::Delete => self.store.remove(&[key.as_str()]).await,
            CounterUpdate::Unchanged => Ok(()),
        }
    }
}
