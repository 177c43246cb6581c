//! Service worker entry point.

use futures::channel::oneshot;
use js_sys::Function;
use lb_core::background::{self, BackgroundHandle, NavigationKind};
use lb_core::types::Namespace;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;

use crate::chrome::{self, ChromeStore};

const NAVIGATION_EVENTS: &[(&str, NavigationKind)] = &[
    ("onCompleted", NavigationKind::Completed),
    ("onHistoryStateUpdated", NavigationKind::HistoryStateUpdated),
    ("onReferenceFragmentUpdated", NavigationKind::ReferenceFragmentUpdated),
];

/// Register the background listeners and start the event loop.
#[wasm_bindgen]
pub fn start_background() -> Result<(), JsValue> {
    crate::install_hooks();

    let store = ChromeStore::new(Namespace::Local)?;
    let (background, handle) = background::channel(store);

    listen_messages(handle.clone())?;
    listen_navigation(&handle)?;
    listen_tab_removal(handle)?;

    spawn_local(background.run());
    Ok(())
}

fn listen_messages(handle: BackgroundHandle) -> Result<(), JsValue> {
    let callback = Closure::wrap(Box::new(
        move |message: JsValue, sender: JsValue, send_response: JsValue| -> JsValue {
            let payload = chrome::from_js(&message).unwrap_or(Value::Null);
            let (reply, response) = oneshot::channel();
            if let Err(e) = handle.post_message(chrome::sender_tab_id(&sender), payload, reply) {
                log::error!("Error - {}", e);
                return JsValue::FALSE;
            }
            spawn_local(async move {
                let Ok(ack) = response.await else {
                    return;
                };
                let Some(send_response) = send_response.dyn_ref::<Function>() else {
                    return;
                };
                if let Err(e) = send_response.call1(&JsValue::UNDEFINED, &JsValue::from_str(ack.as_str())) {
                    log::debug!("Could not deliver reply - {}", chrome::error_message(&e));
                }
            });
            // Keep the response channel open for the asynchronous reply.
            JsValue::TRUE
        },
    ) as Box<dyn FnMut(JsValue, JsValue, JsValue) -> JsValue>);

    let event = chrome::api(&["chrome", "runtime", "onMessage"])?;
    chrome::add_listener(&event, callback.as_ref().unchecked_ref())?;
    callback.forget();
    Ok(())
}

fn listen_navigation(handle: &BackgroundHandle) -> Result<(), JsValue> {
    for &(name, kind) in NAVIGATION_EVENTS {
        let handle = handle.clone();
        let callback = Closure::wrap(Box::new(move |details: JsValue| {
            let Some((tab_id, frame_id, url)) = chrome::navigation_details(&details) else {
                log::warn!("Malformed navigation details");
                return;
            };
            if let Err(e) = handle.navigation(tab_id, frame_id, url, kind) {
                log::error!("Error - {}", e);
            }
        }) as Box<dyn FnMut(JsValue)>);

        let event = chrome::api(&["chrome", "webNavigation", name])?;
        chrome::add_listener(&event, callback.as_ref().unchecked_ref())?;
        callback.forget();
    }
    Ok(())
}

fn listen_tab_removal(handle: BackgroundHandle) -> Result<(), JsValue> {
    let callback = Closure::wrap(Box::new(move |tab_id: JsValue, _info: JsValue| {
        let Some(tab_id) = tab_id.as_f64() else {
            return;
        };
        if let Err(e) = handle.tab_removed(tab_id as i32) {
            log::error!("Error - {}", e);
        }
    }) as Box<dyn FnMut(JsValue, JsValue)>);

    let event = chrome::api(&["chrome", "tabs", "onRemoved"])?;
    chrome::add_listener(&event, callback.as_ref().unchecked_ref())?;
    callback.forget();
    Ok(())
}
