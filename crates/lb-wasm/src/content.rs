//! Content script entry point.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use js_sys::Reflect;
use lb_core::config::BlockerConfig;
use lb_core::messages::ScanReport;
use lb_core::scanner::{follow_enabled_flag, IntervalDriver, MediaElement, ScanController, Substituter};
use lb_core::types::MediaKind;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Element, HtmlElement, HtmlMediaElement, Window};

use crate::chrome::{self, ChromeStore};

// =============================================================================
// DOM Media
// =============================================================================

/// A matched `img`, `video` or `iframe` element.
pub struct DomMedia {
    element: Element,
    kind: Option<MediaKind>,
}

impl DomMedia {
    pub fn new(element: Element) -> Self {
        let kind = MediaKind::parse_kind(&element.tag_name());
        Self { element, kind }
    }

    fn property(&self, name: &str) -> String {
        Reflect::get(&self.element, &JsValue::from_str(name))
            .ok()
            .and_then(|v| v.as_string())
            .unwrap_or_default()
    }

    fn set_property(&self, name: &str, value: &str) {
        if Reflect::set(&self.element, &JsValue::from_str(name), &JsValue::from_str(value)).is_err() {
            log::debug!("Could not set {} on <{}>", name, self.element.tag_name());
        }
    }
}

impl MediaElement for DomMedia {
    fn kind(&self) -> Option<MediaKind> {
        self.kind
    }

    fn src(&self) -> String {
        self.property("src")
    }

    fn srcset(&self) -> String {
        self.property("srcset")
    }

    fn data_src(&self) -> Option<String> {
        self.element.dyn_ref::<HtmlElement>()?.dataset().get("src")
    }

    fn set_src(&mut self, url: &str) {
        self.set_property("src", url);
    }

    fn set_srcset(&mut self, url: &str) {
        self.set_property("srcset", url);
    }

    fn set_data_src(&mut self, url: &str) {
        if let Some(element) = self.element.dyn_ref::<HtmlElement>() {
            if let Err(e) = element.dataset().set("src", url) {
                log::debug!(
                    "Could not set data-src on <{}> - {}",
                    self.element.tag_name(),
                    chrome::error_message(&e)
                );
            }
        }
    }

    fn set_autoplay(&mut self, autoplay: bool) {
        if let Some(media) = self.element.dyn_ref::<HtmlMediaElement>() {
            media.set_autoplay(autoplay);
        }
    }
}

// =============================================================================
// Scan Pass
// =============================================================================

fn collect_media(window: &Window, selector: &str) -> Vec<DomMedia> {
    let Some(document) = window.document() else {
        return Vec::new();
    };
    let Ok(nodes) = document.query_selector_all(selector) else {
        return Vec::new();
    };
    (0..nodes.length())
        .filter_map(|i| nodes.item(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .map(DomMedia::new)
        .collect()
}

fn random_index(n: usize) -> usize {
    (js_sys::Math::random() * n as f64).floor() as usize
}

fn run_pass(window: &Window, substituter: &Substituter, selector: &str) {
    let mut media = collect_media(window, selector);
    let count = substituter.scan_pass_with(&mut media, &mut random_index);
    let hostname = window.location().hostname().unwrap_or_default();
    if let Some(report) = ScanReport::for_pass(count, hostname) {
        spawn_local(send_report(report));
    }
}

async fn send_report(report: ScanReport) {
    let result = match chrome::to_js(&report.to_message()) {
        Ok(message) => match chrome::api(&["chrome", "runtime"]) {
            Ok(runtime) => chrome::call_async(&runtime, "sendMessage", &[message]).await,
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };
    match result {
        Ok(response) => log::debug!("{}", response.as_string().unwrap_or_default()),
        Err(e) => log::error!("Error - {}", chrome::error_message(&e)),
    }
}

// =============================================================================
// Interval Timer
// =============================================================================

/// `setInterval`-backed driver running the scan pass.
pub struct IntervalTimer {
    window: Window,
    pass: Rc<dyn Fn()>,
}

impl IntervalDriver for IntervalTimer {
    type Handle = (i32, Closure<dyn FnMut()>);

    fn start(&mut self, period: Duration) -> Self::Handle {
        let pass = Rc::clone(&self.pass);
        let tick = Closure::wrap(Box::new(move || pass()) as Box<dyn FnMut()>);
        let id = self
            .window
            .set_interval_with_callback_and_timeout_and_arguments_0(
                tick.as_ref().unchecked_ref(),
                period.as_millis().min(i32::MAX as u128) as i32,
            )
            .unwrap_or_else(|e| {
                log::error!("Error starting scan interval - {}", chrome::error_message(&e));
                -1
            });
        (id, tick)
    }

    fn stop(&mut self, (id, tick): Self::Handle) {
        self.window.clear_interval_with_handle(id);
        drop(tick);
    }
}

// =============================================================================
// Entry Point
// =============================================================================

fn runtime_url(runtime: &JsValue, path: &str) -> String {
    Reflect::get(runtime, &JsValue::from_str("getURL"))
        .ok()
        .and_then(|f| f.dyn_into::<js_sys::Function>().ok())
        .and_then(|f| f.call1(runtime, &JsValue::from_str(path)).ok())
        .and_then(|url| url.as_string())
        .unwrap_or_else(|| path.to_string())
}

/// Start substituting page media. `config_json` overrides the defaults.
#[wasm_bindgen]
pub fn start_content(config_json: Option<String>) -> Result<(), JsValue> {
    crate::install_hooks();

    let config = match config_json {
        Some(text) => BlockerConfig::from_json(&text).map_err(crate::core_error)?,
        None => BlockerConfig::default(),
    };
    let kinds = config.media_kinds().map_err(crate::core_error)?;
    let runtime = chrome::api(&["chrome", "runtime"])?;
    let assets = config.assets.resolve(|path| runtime_url(&runtime, path));
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;

    let substituter = Substituter::new(&assets, kinds);
    let selector = kinds.selector();
    let pass_window = window.clone();
    let pass: Rc<dyn Fn()> = Rc::new(move || run_pass(&pass_window, &substituter, &selector));

    let controller = Rc::new(RefCell::new(ScanController::new(
        IntervalTimer { window, pass },
        config.scan_interval(),
    )));

    // The store owns the change listeners, so it lives as long as the page.
    let store: &'static ChromeStore = Box::leak(Box::new(ChromeStore::new(config.namespace)?));
    spawn_local(async move {
        if let Err(e) = follow_enabled_flag(store, controller).await {
            log::error!("Error on content script - {}", e);
        }
    });
    Ok(())
}
