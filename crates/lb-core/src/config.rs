//! Extension configuration
//!
//! Loaded from JSON; every field has a default so an empty object is a
//! valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{MediaKind, Namespace};

// =============================================================================
// Scan Interval
// =============================================================================

/// Interval between scan passes in production builds.
pub const PROD_INTERVAL_MS: u64 = 100;

/// Interval between scan passes while debugging.
pub const DEBUG_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanProfile {
    Debug,
    Production,
}

impl ScanProfile {
    pub fn interval_ms(&self) -> u64 {
        match self {
            Self::Debug => DEBUG_INTERVAL_MS,
            Self::Production => PROD_INTERVAL_MS,
        }
    }
}

// =============================================================================
// Replacement Assets
// =============================================================================

pub const DEFAULT_EMBED_URL: &str = "https://www.youtube.com/embed/BJ7rjR1X_3k";
pub const DEFAULT_VIDEO_PATH: &str = "../videos/one-piece.mp4";
pub const DEFAULT_IMAGE_PATHS: &[&str] = &[
    "../images/injected/luffy2.jpg",
    "../images/injected/luffy3.jpeg",
    "../images/injected/luffy4.jpg",
    "../images/injected/luffy5.jpeg",
    "../images/injected/luffy6.webp",
    "../images/injected/luffy7.jpeg",
    "../images/injected/luffy8.jpeg",
    "../images/injected/luffy9.png",
    "../images/injected/luffy10.png",
];

/// Content substituted into the page.
///
/// `images` and `video` are extension resource paths until
/// [`resolve`](Self::resolve)d into absolute URLs; `embed` is already absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplacementAssets {
    pub images: Vec<String>,
    pub video: String,
    pub embed: String,
}

impl Default for ReplacementAssets {
    fn default() -> Self {
        Self {
            images: DEFAULT_IMAGE_PATHS.iter().map(|p| p.to_string()).collect(),
            video: DEFAULT_VIDEO_PATH.to_string(),
            embed: DEFAULT_EMBED_URL.to_string(),
        }
    }
}

impl ReplacementAssets {
    /// Map resource paths through `resolve` (e.g. `runtime.getURL`).
    pub fn resolve(&self, resolve: impl Fn(&str) -> String) -> Self {
        Self {
            images: self.images.iter().map(|p| resolve(p)).collect(),
            video: resolve(&self.video),
            embed: self.embed.clone(),
        }
    }
}

// =============================================================================
// Blocker Config
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BlockerConfig {
    pub scan_interval_ms: u64,
    pub namespace: Namespace,
    pub assets: ReplacementAssets,
    pub kinds: Vec<String>,
}

impl Default for BlockerConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: PROD_INTERVAL_MS,
            namespace: Namespace::Local,
            assets: ReplacementAssets::default(),
            kinds: vec!["image".into(), "video".into(), "iframe".into()],
        }
    }
}

impl BlockerConfig {
    pub fn for_profile(profile: ScanProfile) -> Self {
        Self {
            scan_interval_ms: profile.interval_ms(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_ms == 0 {
            return Err(Error::invalid_config("scanIntervalMs must be greater than 0"));
        }
        if self.assets.images.is_empty() {
            return Err(Error::invalid_config("assets.images must not be empty"));
        }
        if self.assets.video.is_empty() || self.assets.embed.is_empty() {
            return Err(Error::invalid_config("assets.video and assets.embed are required"));
        }
        self.media_kinds()?;
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// Kinds to substitute. An empty list disables substitution entirely.
    pub fn media_kinds(&self) -> Result<MediaKind> {
        self.kinds.iter().try_fold(MediaKind::empty(), |acc, name| {
            MediaKind::parse_kind(name)
                .map(|kind| acc | kind)
                .ok_or_else(|| Error::invalid_config(format!("unknown media kind '{}'", name)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = BlockerConfig::from_json("{}").unwrap();
        assert_eq!(config, BlockerConfig::default());
        assert_eq!(config.scan_interval(), Duration::from_millis(100));
        assert_eq!(config.media_kinds().unwrap(), MediaKind::ALL);
    }

    #[test]
    fn test_partial_config() {
        let config = BlockerConfig::from_json(
            r#"{"scanIntervalMs": 250, "namespace": "session", "kinds": ["img"], "assets": {"video": "v.mp4"}}"#,
        )
        .unwrap();
        assert_eq!(config.scan_interval_ms, 250);
        assert_eq!(config.namespace, Namespace::Session);
        assert_eq!(config.media_kinds().unwrap(), MediaKind::IMAGE);
        assert_eq!(config.assets.video, "v.mp4");
        assert_eq!(config.assets.images.len(), DEFAULT_IMAGE_PATHS.len());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            BlockerConfig::from_json(r#"{"scanIntervalMs": 0}"#),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(matches!(
            BlockerConfig::from_json(r#"{"assets": {"images": []}}"#),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(matches!(
            BlockerConfig::from_json(r#"{"kinds": ["canvas"]}"#),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(matches!(
            BlockerConfig::from_json(r#"{"scanInterval": 5}"#),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_profiles() {
        assert_eq!(BlockerConfig::for_profile(ScanProfile::Debug).scan_interval_ms, 5000);
        assert_eq!(BlockerConfig::for_profile(ScanProfile::Production).scan_interval_ms, 100);
    }

    #[test]
    fn test_resolve_assets() {
        let assets = ReplacementAssets::default().resolve(|p| format!("chrome-extension://id/{}", p));
        assert!(assets.images[0].starts_with("chrome-extension://id/"));
        assert_eq!(assets.video, "chrome-extension://id/../videos/one-piece.mp4");
        assert_eq!(assets.embed, DEFAULT_EMBED_URL);
    }
}
