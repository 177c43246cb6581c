//! Popup view model
//!
//! The popup shows the focused tab's hostname, the enabled toggle and the
//! tab's blocked count. It loads both values once when opened and then
//! follows store change notifications; it never polls.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;
use crate::keys::{blocked_page_key, BLOCKING_ENABLED_KEY};
use crate::store::{Store, SubscriptionId};
use crate::toggle::{set_enabled, DEFAULT_ENABLED};
use crate::types::{ChangeSet, Namespace, TabCounterEntry, TabId};
use crate::url::hostname;
use crate::watch::KeyWatch;

/// Everything the popup renders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PopupState {
    pub hostname: String,
    pub enabled: bool,
    pub num_blocked: u64,
}

/// Rendering surface for [`PopupState`].
pub trait PopupView {
    fn render(&mut self, state: &PopupState);
}

/// Format a count with thousands separators, e.g. `1,234,567`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// State of an open popup for one tab.
pub struct PopupModel {
    tab_id: TabId,
    state: PopupState,
    enabled_watch: KeyWatch<bool>,
    counter_watch: KeyWatch<TabCounterEntry>,
}

impl PopupModel {
    /// Read the initial state for the focused tab `tab_id` showing `tab_url`.
    pub async fn load<S: Store>(store: &S, tab_id: TabId, tab_url: &str) -> Result<Self> {
        let counter_key = blocked_page_key(tab_id);
        let items = store.get(&[BLOCKING_ENABLED_KEY, counter_key.as_str()]).await?;

        let enabled = items
            .get(BLOCKING_ENABLED_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(DEFAULT_ENABLED);
        let num_blocked = items
            .get(&counter_key)
            .and_then(TabCounterEntry::from_value)
            .map_or(0, |entry| entry.num_blocked);

        Ok(Self::new(
            store.namespace(),
            tab_id,
            PopupState {
                hostname: hostname(tab_url).unwrap_or_default(),
                enabled,
                num_blocked,
            },
        ))
    }

    pub fn new(namespace: Namespace, tab_id: TabId, state: PopupState) -> Self {
        Self {
            tab_id,
            state,
            enabled_watch: KeyWatch::new(namespace, BLOCKING_ENABLED_KEY),
            counter_watch: KeyWatch::new(namespace, blocked_page_key(tab_id)),
        }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn state(&self) -> &PopupState {
        &self.state
    }

    pub fn formatted_count(&self) -> String {
        format_count(self.state.num_blocked)
    }

    /// Fold a store notification into the state. Returns whether anything
    /// the popup shows changed.
    pub fn apply_changes(&mut self, namespace: Namespace, changes: &ChangeSet) -> bool {
        let before = self.state.clone();
        if let Some(change) = self.enabled_watch.extract(namespace, changes) {
            self.state.enabled = change.new_value.unwrap_or(DEFAULT_ENABLED);
        }
        if let Some(change) = self.counter_watch.extract(namespace, changes) {
            self.state.num_blocked = change.new_value.map_or(0, |entry| entry.num_blocked);
        }
        self.state != before
    }
}

/// Render `model` into `view` now and after every relevant store change.
pub fn bind<S, V>(store: &S, model: PopupModel, mut view: V) -> (Rc<RefCell<PopupModel>>, SubscriptionId)
where
    S: Store,
    V: PopupView + 'static,
{
    view.render(model.state());
    let model = Rc::new(RefCell::new(model));
    let observed = Rc::clone(&model);
    let view = RefCell::new(view);
    let subscription = store.subscribe(Box::new(move |namespace, changes| {
        let mut model = observed.borrow_mut();
        if model.apply_changes(namespace, changes) {
            view.borrow_mut().render(model.state());
        }
    }));
    (model, subscription)
}

/// Handle the user flipping the toggle.
pub async fn toggle<S: Store>(store: &S, enabled: bool) -> Result<()> {
    set_enabled(store, enabled).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::TabCounters;
    use crate::store::MemoryStore;
    use futures::executor::block_on;

    #[derive(Clone, Default)]
    struct RecordingView(Rc<RefCell<Vec<PopupState>>>);

    impl PopupView for RecordingView {
        fn render(&mut self, state: &PopupState) {
            self.0.borrow_mut().push(state.clone());
        }
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1234567), "1,234,567");
        assert_eq!(format_count(100000), "100,000");
    }

    #[test]
    fn test_load_defaults() {
        let store = MemoryStore::default();
        let model = block_on(PopupModel::load(&store, 3, "about:blank")).unwrap();
        assert_eq!(
            model.state(),
            &PopupState {
                hostname: String::new(),
                enabled: true,
                num_blocked: 0
            }
        );
    }

    #[test]
    fn test_load_existing_counter() {
        let mut counters = TabCounters::new(MemoryStore::default());
        block_on(counters.record_scan(3, "example.com", 1500)).unwrap();
        block_on(set_enabled(counters.store(), false)).unwrap();

        let model = block_on(PopupModel::load(counters.store(), 3, "https://example.com/a")).unwrap();
        assert_eq!(model.state().hostname, "example.com");
        assert!(!model.state().enabled);
        assert_eq!(model.formatted_count(), "1,500");
    }

    #[test]
    fn test_bound_view_follows_store() {
        let mut counters = TabCounters::new(MemoryStore::default());
        let model = block_on(PopupModel::load(counters.store(), 5, "https://a.com/")).unwrap();
        let view = RecordingView::default();
        let rendered = Rc::clone(&view.0);
        bind(counters.store(), model, view);

        block_on(counters.record_scan(5, "a.com", 2)).unwrap();
        block_on(counters.record_scan(6, "b.com", 9)).unwrap();
        block_on(toggle(counters.store(), false)).unwrap();
        block_on(counters.close(5)).unwrap();

        let counts: Vec<_> = rendered.borrow().iter().map(|s| (s.num_blocked, s.enabled)).collect();
        assert_eq!(counts, vec![(0, true), (2, true), (2, false), (0, false)]);
    }

    #[test]
    fn test_unbound_view_stops_rendering() {
        let mut counters = TabCounters::new(MemoryStore::default());
        let model = block_on(PopupModel::load(counters.store(), 5, "https://a.com/")).unwrap();
        let view = RecordingView::default();
        let rendered = Rc::clone(&view.0);
        let (model, subscription) = bind(counters.store(), model, view);

        block_on(counters.record_scan(5, "a.com", 2)).unwrap();
        assert!(counters.store().unsubscribe(subscription));
        block_on(counters.record_scan(5, "a.com", 3)).unwrap();

        assert_eq!(rendered.borrow().len(), 2);
        assert_eq!(model.borrow().state().num_blocked, 2);
    }
}
