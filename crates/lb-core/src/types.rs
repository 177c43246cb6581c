//! Core type definitions for LuffyBlocker
//!
//! These types map directly to the values kept in the extension store and
//! the payloads exchanged between the background, content and popup surfaces.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// =============================================================================
// Identifiers
// =============================================================================

/// Host-assigned tab identifier. Unique per open tab, never reused.
pub type TabId = i32;

/// Host-assigned frame identifier within a tab.
pub type FrameId = i32;

/// Frame id of a tab's top-level document.
pub const MAIN_FRAME_ID: FrameId = 0;

// =============================================================================
// Store Namespaces
// =============================================================================

/// Storage area a store instance is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Persistent per-profile storage (`chrome.storage.local`)
    #[default]
    Local,
    /// In-memory storage cleared when the browser exits (`chrome.storage.session`)
    Session,
}

impl Namespace {
    /// Parse the area name reported by `storage.onChanged`.
    pub fn from_area(area: &str) -> Option<Self> {
        match area {
            "local" => Some(Self::Local),
            "session" => Some(Self::Session),
            _ => None,
        }
    }

    /// Area name as used by the host storage API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Session => "session",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Store Values and Change Notifications
// =============================================================================

/// Partial key-value map returned by `get` and accepted by `set`.
pub type StoreMap = serde_json::Map<String, Value>;

/// Old and new value of one key, as delivered by `storage.onChanged`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

/// All key changes produced by a single store mutation.
pub type ChangeSet = BTreeMap<String, StorageChange>;

// =============================================================================
// Tab Counter Entry
// =============================================================================

/// Per-tab count of substituted elements, scoped to the current hostname.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabCounterEntry {
    pub hostname: String,
    pub num_blocked: u64,
}

/// Accepted stored shapes. The bare integer is an older schema that carried
/// no hostname; it is read as an entry with an empty hostname.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCounter {
    Entry {
        #[serde(default)]
        hostname: String,
        #[serde(rename = "numBlocked")]
        num_blocked: u64,
    },
    Legacy(u64),
}

impl<'de> Deserialize<'de> for TabCounterEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match StoredCounter::deserialize(deserializer)? {
            StoredCounter::Entry { hostname, num_blocked } => Self { hostname, num_blocked },
            StoredCounter::Legacy(num_blocked) => Self {
                hostname: String::new(),
                num_blocked,
            },
        })
    }
}

impl TabCounterEntry {
    pub fn new(hostname: impl Into<String>, num_blocked: u64) -> Self {
        Self {
            hostname: hostname.into(),
            num_blocked,
        }
    }

    /// Decode a stored value. Returns `None` for shapes that are neither the
    /// object form nor the legacy integer.
    pub fn from_value(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }

    /// Encode in the canonical object form.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "hostname": self.hostname,
            "numBlocked": self.num_blocked,
        })
    }
}

// =============================================================================
// Media Kinds
// =============================================================================

bitflags::bitflags! {
    /// Element kinds the content scanner substitutes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MediaKind: u8 {
        const IMAGE = 1 << 0;
        const VIDEO = 1 << 1;
        const IFRAME = 1 << 2;

        /// All substitutable kinds
        const ALL = Self::IMAGE.bits() | Self::VIDEO.bits() | Self::IFRAME.bits();
    }
}

impl MediaKind {
    /// Parse from an element tag name or a config kind name.
    pub fn parse_kind(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "img" | "image" => Some(Self::IMAGE),
            "video" => Some(Self::VIDEO),
            "iframe" => Some(Self::IFRAME),
            _ => None,
        }
    }

    /// CSS selector matching every element of the contained kinds.
    pub fn selector(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if self.contains(Self::IFRAME) {
            parts.push("iframe");
        }
        if self.contains(Self::IMAGE) {
            parts.push("img");
        }
        if self.contains(Self::VIDEO) {
            parts.push("video");
        }
        parts.join(",")
    }
}
