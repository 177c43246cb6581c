//! Popup page entry point.

use lb_core::popup::{self, bind, format_count, PopupModel, PopupState, PopupView};
use lb_core::store::Store;
use lb_core::types::Namespace;
use serde_json::json;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Document, Event, HtmlInputElement};

use crate::chrome::{self, ChromeStore};

const CURRENT_URL_SELECTOR: &str = "#current-url";
const NUM_BLOCKED_SELECTOR: &str = "#num-blocked";
const TOGGLE_SELECTOR: &str = "#enable-blocking";

struct DomPopupView {
    document: Document,
}

impl DomPopupView {
    fn set_text(&self, selector: &str, text: &str) {
        if let Ok(Some(element)) = self.document.query_selector(selector) {
            element.set_text_content(Some(text));
        }
    }

    fn toggle(&self) -> Option<HtmlInputElement> {
        self.document
            .query_selector(TOGGLE_SELECTOR)
            .ok()
            .flatten()
            .and_then(|e| e.dyn_into::<HtmlInputElement>().ok())
    }
}

impl PopupView for DomPopupView {
    fn render(&mut self, state: &PopupState) {
        self.set_text(CURRENT_URL_SELECTOR, &state.hostname);
        self.set_text(NUM_BLOCKED_SELECTOR, &format_count(state.num_blocked));
        if let Some(toggle) = self.toggle() {
            toggle.set_checked(state.enabled);
        }
    }
}

/// Populate the popup for the focused tab and wire the toggle.
#[wasm_bindgen]
pub async fn start_popup() -> Result<(), JsValue> {
    crate::install_hooks();

    let tabs = chrome::api(&["chrome", "tabs"])?;
    let query = chrome::to_js(&json!({"active": true, "currentWindow": true}))?;
    let result = chrome::call_async(&tabs, "query", &[query]).await?;
    let (tab_id, url) = chrome::tab_info(&js_sys::Array::from(&result).get(0))
        .ok_or_else(|| JsValue::from_str("No active tab"))?;

    let store: &'static ChromeStore = Box::leak(Box::new(ChromeStore::new(Namespace::Local)?));
    let model = PopupModel::load(store, tab_id, &url)
        .await
        .map_err(crate::core_error)?;

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("No document"))?;
    let view = DomPopupView {
        document,
    };
    let toggle = view
        .toggle()
        .ok_or_else(|| JsValue::from_str("Missing toggle element"))?;
    let (_model, subscription) = bind(store, model, view);

    // Stop listening for storage changes once the popup closes.
    let on_hide = Closure::wrap(Box::new(move |_event: Event| {
        if store.unsubscribe(subscription) {
            log::debug!("Popup released storage listener");
        }
    }) as Box<dyn FnMut(Event)>);
    window.add_event_listener_with_callback("pagehide", on_hide.as_ref().unchecked_ref())?;
    on_hide.forget();

    let input = toggle.clone();
    let on_change = Closure::wrap(Box::new(move |_event: Event| {
        let enabled = input.checked();
        spawn_local(async move {
            if let Err(e) = popup::toggle(store, enabled).await {
                log::error!("Error on popup - {}", e);
            }
        });
    }) as Box<dyn FnMut(Event)>);
    toggle.add_event_listener_with_callback("change", on_change.as_ref().unchecked_ref())?;
    on_change.forget();
    Ok(())
}
