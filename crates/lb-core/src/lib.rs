//! LuffyBlocker Core Library
//!
//! This crate provides the host-independent logic of the LuffyBlocker
//! extension: the per-tab blocked counter protocol, the enabled-flag
//! broadcast, and the testable halves of the content scanner and popup.
//!
//! # Architecture
//!
//! Three surfaces share one namespaced key-value store. The background is
//! the single writer of tab counters and serializes every mutation through
//! one event queue; the content scanner and popup observe the store through
//! typed change subscriptions. Host glue (DOM, `chrome.*`) lives in
//! `lb-wasm`; everything here runs natively.
//!
//! # Modules
//!
//! - `types`: Shared type definitions
//! - `keys`: Store key layout
//! - `url`: Hostname extraction for navigation URLs
//! - `store`: Store trait and in-memory implementation
//! - `watch`: Typed per-key change subscriptions
//! - `toggle`: Enabled flag broadcast
//! - `counter`: Tab counter protocol
//! - `messages`: Cross-surface message payloads
//! - `background`: Single-writer background event loop
//! - `scanner`: Substitution rules and scan scheduling
//! - `popup`: Popup view model
//! - `config`: Extension configuration

pub mod background;
pub mod config;
pub mod counter;
pub mod error;
pub mod keys;
pub mod messages;
pub mod popup;
pub mod scanner;
pub mod store;
pub mod toggle;
pub mod types;
pub mod url;
pub mod watch;

// Re-export commonly used types
pub use background::{Background, BackgroundHandle, HostEvent, NavigationKind};
pub use config::{BlockerConfig, ReplacementAssets, ScanProfile};
pub use counter::TabCounters;
pub use error::{Error, Result};
pub use messages::{Ack, Request, ScanReport};
pub use store::{MemoryStore, Store, SubscriptionId};
pub use types::{ChangeSet, MediaKind, Namespace, StorageChange, StoreMap, TabCounterEntry, TabId};
