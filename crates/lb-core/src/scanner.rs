//! Content scanner
//!
//! A scan pass walks the page's media elements and points every one that is
//! not already showing replacement content at a replacement asset. The page
//! side is abstracted behind [`MediaElement`] so the substitution rules run
//! natively in tests; the browser implementation lives in `lb-wasm`.
//!
//! [`ScanController`] owns the periodic pass. It holds at most one running
//! interval, and stopping it is synchronous: a pass already running
//! finishes, no further pass starts, and missed passes are never replayed.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use crate::config::ReplacementAssets;
use crate::error::Result;
use crate::store::{Store, SubscriptionId};
use crate::toggle::{read_enabled, watch_enabled};
use crate::types::MediaKind;

// =============================================================================
// Page Elements
// =============================================================================

/// A page element the scanner may substitute.
pub trait MediaElement {
    /// Kind derived from the tag name; `None` for anything else.
    fn kind(&self) -> Option<MediaKind>;
    fn src(&self) -> String;
    fn srcset(&self) -> String;
    /// Value of the `data-src` attribute, if present.
    fn data_src(&self) -> Option<String>;
    fn set_src(&mut self, url: &str);
    fn set_srcset(&mut self, url: &str);
    fn set_data_src(&mut self, url: &str);
    fn set_autoplay(&mut self, autoplay: bool);
}

/// Strip the first `/..` segment, matching how the browser normalizes a
/// resource URL once it is assigned to an element.
pub fn normalize_asset_url(url: &str) -> String {
    url.replacen("/..", "", 1)
}

// =============================================================================
// Substituter
// =============================================================================

/// Substitution rules for one page.
pub struct Substituter {
    kinds: MediaKind,
    images: Vec<String>,
    image_check: HashSet<String>,
    video: String,
    video_check: String,
    embed: String,
    next_image: usize,
}

impl Substituter {
    /// `assets` must already be resolved to absolute URLs.
    pub fn new(assets: &ReplacementAssets, kinds: MediaKind) -> Self {
        let image_check = assets
            .images
            .iter()
            .flat_map(|url| [url.clone(), normalize_asset_url(url)])
            .collect();
        Self {
            kinds,
            images: assets.images.clone(),
            image_check,
            video: assets.video.clone(),
            video_check: normalize_asset_url(&assets.video),
            embed: assets.embed.clone(),
            next_image: 0,
        }
    }

    pub fn kinds(&self) -> MediaKind {
        self.kinds
    }

    /// Whether `element` already shows replacement content. Elements of
    /// kinds this substituter does not act on count as substituted.
    pub fn is_substituted<E: MediaElement>(&self, element: &E) -> bool {
        let Some(kind) = element.kind().filter(|k| self.kinds.contains(*k)) else {
            return true;
        };
        if kind == MediaKind::IFRAME {
            element.data_src().as_deref() == Some(self.embed.as_str()) && element.src() == self.embed
        } else if kind == MediaKind::IMAGE {
            self.images.is_empty()
                || self.image_check.contains(&element.src())
                || self.image_check.contains(&element.srcset())
        } else {
            let src = element.src();
            src == self.video_check || src == self.video
        }
    }

    /// Substitute one element. Returns `false` if it was left alone.
    /// `pick` chooses an index below its argument into the image list.
    pub fn substitute<E: MediaElement>(
        &self,
        element: &mut E,
        pick: &mut dyn FnMut(usize) -> usize,
    ) -> bool {
        if self.is_substituted(element) {
            return false;
        }
        let Some(kind) = element.kind() else {
            return false;
        };
        if kind == MediaKind::IFRAME {
            element.set_data_src(&self.embed);
            element.set_src(&self.embed);
        } else if kind == MediaKind::IMAGE {
            let image = &self.images[pick(self.images.len()) % self.images.len()];
            element.set_srcset(image);
            element.set_src(image);
        } else {
            element.set_src(&self.video);
            element.set_autoplay(true);
        }
        true
    }

    /// One pass with a caller-chosen image picker. Returns the number of
    /// elements substituted.
    pub fn scan_pass_with<E: MediaElement>(
        &self,
        elements: &mut [E],
        pick: &mut dyn FnMut(usize) -> usize,
    ) -> usize {
        let mut count = 0;
        for element in elements.iter_mut() {
            if self.substitute(element, pick) {
                count += 1;
            }
        }
        count
    }

    /// One pass cycling through the replacement images in order.
    pub fn scan_pass<E: MediaElement>(&mut self, elements: &mut [E]) -> usize {
        let mut cursor = self.next_image;
        let count = self.scan_pass_with(elements, &mut |n| {
            let index = cursor % n;
            cursor += 1;
            index
        });
        self.next_image = cursor;
        count
    }
}

// =============================================================================
// Scheduling
// =============================================================================

/// Host timer able to run the scan pass periodically.
pub trait IntervalDriver {
    type Handle;

    /// Start running the pass every `period`.
    fn start(&mut self, period: Duration) -> Self::Handle;

    /// Cancel a running interval. Must not return before the cancellation
    /// takes effect.
    fn stop(&mut self, handle: Self::Handle);
}

/// Starts and stops the periodic scan as the enabled flag changes.
pub struct ScanController<D: IntervalDriver> {
    driver: D,
    period: Duration,
    active: Option<D::Handle>,
}

impl<D: IntervalDriver> ScanController<D> {
    pub fn new(driver: D, period: Duration) -> Self {
        Self {
            driver,
            period,
            active: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Follow the enabled flag. Returns whether the scan state changed;
    /// enabling a running scan does not start a second interval.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        match (enabled, self.active.take()) {
            (true, None) => {
                self.active = Some(self.driver.start(self.period));
                log::info!("Started blocking");
                true
            }
            (false, Some(handle)) => {
                self.driver.stop(handle);
                log::info!("Disabled blocking");
                true
            }
            (_, active) => {
                self.active = active;
                false
            }
        }
    }
}

/// Wire a controller to the enabled flag in `store`: start scanning now if
/// enabled, then follow every change.
pub async fn follow_enabled_flag<S, D>(
    store: &S,
    controller: Rc<RefCell<ScanController<D>>>,
) -> Result<SubscriptionId>
where
    S: Store,
    D: IntervalDriver + 'static,
{
    let watched = Rc::clone(&controller);
    let subscription = watch_enabled(store, move |enabled| {
        watched.borrow_mut().set_enabled(enabled);
    });
    let enabled = read_enabled(store).await?;
    controller.borrow_mut().set_enabled(enabled);
    Ok(subscription)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::toggle::set_enabled;
    use futures::executor::block_on;

    #[derive(Debug, Clone, Default)]
    struct FakeElement {
        tag: &'static str,
        src: String,
        srcset: String,
        data_src: Option<String>,
        autoplay: bool,
    }

    impl FakeElement {
        fn new(tag: &'static str, src: &str) -> Self {
            Self {
                tag,
                src: src.to_string(),
                ..Default::default()
            }
        }
    }

    impl MediaElement for FakeElement {
        fn kind(&self) -> Option<MediaKind> {
            MediaKind::parse_kind(self.tag)
        }
        fn src(&self) -> String {
            self.src.clone()
        }
        fn srcset(&self) -> String {
            self.srcset.clone()
        }
        fn data_src(&self) -> Option<String> {
            self.data_src.clone()
        }
        fn set_src(&mut self, url: &str) {
            self.src = url.to_string();
        }
        fn set_srcset(&mut self, url: &str) {
            self.srcset = url.to_string();
        }
        fn set_data_src(&mut self, url: &str) {
            self.data_src = Some(url.to_string());
        }
        fn set_autoplay(&mut self, autoplay: bool) {
            self.autoplay = autoplay;
        }
    }

    fn assets() -> ReplacementAssets {
        ReplacementAssets::default().resolve(|p| format!("chrome-extension://id/{}", p))
    }

    fn page() -> Vec<FakeElement> {
        vec![
            FakeElement::new("iframe", "https://ads.example/frame"),
            FakeElement::new("img", "https://cdn.example/a.png"),
            FakeElement::new("img", "https://cdn.example/b.png"),
            FakeElement::new("video", "https://cdn.example/clip.mp4"),
            FakeElement::new("div", ""),
        ]
    }

    #[test]
    fn test_normalize_asset_url() {
        assert_eq!(
            normalize_asset_url("chrome-extension://id/../images/injected/luffy2.jpg"),
            "chrome-extension://id/images/injected/luffy2.jpg"
        );
        assert_eq!(normalize_asset_url("https://a.com/x"), "https://a.com/x");
    }

    #[test]
    fn test_first_pass_substitutes_everything() {
        let mut substituter = Substituter::new(&assets(), MediaKind::ALL);
        let mut elements = page();
        assert_eq!(substituter.scan_pass(&mut elements), 4);

        assert_eq!(elements[0].src, crate::config::DEFAULT_EMBED_URL);
        assert_eq!(elements[0].data_src.as_deref(), Some(crate::config::DEFAULT_EMBED_URL));
        assert_eq!(elements[1].src, elements[1].srcset);
        assert_ne!(elements[1].src, elements[2].src);
        assert!(elements[3].autoplay);
        assert_eq!(elements[4].src, "");
    }

    #[test]
    fn test_second_pass_is_idle() {
        let mut substituter = Substituter::new(&assets(), MediaKind::ALL);
        let mut elements = page();
        substituter.scan_pass(&mut elements);
        assert_eq!(substituter.scan_pass(&mut elements), 0);

        elements.push(FakeElement::new("img", "https://cdn.example/late.png"));
        assert_eq!(substituter.scan_pass(&mut elements), 1);
    }

    #[test]
    fn test_browser_normalized_src_counts_as_substituted() {
        let substituter = Substituter::new(&assets(), MediaKind::ALL);
        let img = FakeElement::new("img", "chrome-extension://id/images/injected/luffy3.jpeg");
        let video = FakeElement::new("video", "chrome-extension://id/videos/one-piece.mp4");
        assert!(substituter.is_substituted(&img));
        assert!(substituter.is_substituted(&video));
    }

    #[test]
    fn test_iframe_needs_both_attributes() {
        let substituter = Substituter::new(&assets(), MediaKind::ALL);
        let mut frame = FakeElement::new("iframe", crate::config::DEFAULT_EMBED_URL);
        assert!(!substituter.is_substituted(&frame));
        frame.data_src = Some(crate::config::DEFAULT_EMBED_URL.to_string());
        assert!(substituter.is_substituted(&frame));
    }

    #[test]
    fn test_kind_filter() {
        let mut substituter = Substituter::new(&assets(), MediaKind::VIDEO);
        let mut elements = page();
        assert_eq!(substituter.scan_pass(&mut elements), 1);
        assert_eq!(elements[1].src, "https://cdn.example/a.png");
    }

    #[test]
    fn test_custom_picker() {
        let substituter = Substituter::new(&assets(), MediaKind::IMAGE);
        let mut elements = page();
        let count = substituter.scan_pass_with(&mut elements, &mut |_| 4);
        assert_eq!(count, 2);
        assert_eq!(elements[1].src, elements[2].src);
        assert!(elements[1].src.ends_with("luffy6.webp"));
    }

    /// Manually clocked driver: `tick` fires the pass if an interval runs.
    #[derive(Default)]
    struct ManualDriver {
        running: bool,
        starts: usize,
        stops: usize,
        passes: usize,
    }

    impl ManualDriver {
        fn tick(&mut self) {
            if self.running {
                self.passes += 1;
            }
        }
    }

    impl IntervalDriver for ManualDriver {
        type Handle = ();

        fn start(&mut self, _period: Duration) {
            self.running = true;
            self.starts += 1;
        }

        fn stop(&mut self, _handle: ()) {
            self.running = false;
            self.stops += 1;
        }
    }

    #[test]
    fn test_controller_no_duplicate_intervals() {
        let mut controller = ScanController::new(ManualDriver::default(), Duration::from_millis(100));
        assert!(controller.set_enabled(true));
        assert!(!controller.set_enabled(true));
        assert!(controller.set_enabled(false));
        assert!(!controller.set_enabled(false));
        assert_eq!(controller.driver().starts, 1);
        assert_eq!(controller.driver().stops, 1);
    }

    #[test]
    fn test_toggle_stops_and_resumes_without_replay() {
        let mut controller = ScanController::new(ManualDriver::default(), Duration::from_millis(100));
        controller.set_enabled(true);
        controller.driver_mut().tick();
        controller.driver_mut().tick();

        controller.set_enabled(false);
        for _ in 0..5 {
            controller.driver_mut().tick();
        }
        assert_eq!(controller.driver().passes, 2);

        controller.set_enabled(true);
        controller.driver_mut().tick();
        assert_eq!(controller.driver().passes, 3);
    }

    #[test]
    fn test_follow_enabled_flag() {
        let store = MemoryStore::default();
        block_on(set_enabled(&store, false)).unwrap();

        let controller = Rc::new(RefCell::new(ScanController::new(
            ManualDriver::default(),
            Duration::from_millis(100),
        )));
        block_on(follow_enabled_flag(&store, Rc::clone(&controller))).unwrap();
        assert!(!controller.borrow().is_running());

        block_on(set_enabled(&store, true)).unwrap();
        assert!(controller.borrow().is_running());
        block_on(set_enabled(&store, false)).unwrap();
        assert!(!controller.borrow().is_running());
        assert_eq!(controller.borrow().driver().starts, 1);
    }

    #[test]
    fn test_follow_starts_when_flag_absent() {
        let store = MemoryStore::default();
        let controller = Rc::new(RefCell::new(ScanController::new(
            ManualDriver::default(),
            Duration::from_millis(100),
        )));
        block_on(follow_enabled_flag(&store, Rc::clone(&controller))).unwrap();
        assert!(controller.borrow().is_running());
    }
}
