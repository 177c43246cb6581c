//! `chrome.*` API access
//!
//! Thin helpers over `js_sys::Reflect` for reaching extension APIs, plus
//! [`ChromeStore`], the [`Store`] implementation backed by
//! `chrome.storage.<area>`.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use js_sys::{Array, Function, Promise, Reflect, JSON};
use lb_core::store::{ChangeListener, Store, SubscriptionId};
use lb_core::types::{ChangeSet, FrameId, Namespace, StoreMap, TabId};
use lb_core::{Error, Result};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

// =============================================================================
// Reflection Helpers
// =============================================================================

/// Resolve a path from the global object, e.g. `["chrome", "runtime"]`.
pub fn api(path: &[&str]) -> std::result::Result<JsValue, JsValue> {
    let mut current: JsValue = js_sys::global().into();
    for segment in path {
        current = Reflect::get(&current, &JsValue::from_str(segment))?;
        if current.is_undefined() || current.is_null() {
            return Err(JsValue::from_str(&format!("API not available: {}", path.join("."))));
        }
    }
    Ok(current)
}

fn method(target: &JsValue, name: &str) -> std::result::Result<Function, JsValue> {
    Reflect::get(target, &JsValue::from_str(name))?
        .dyn_into::<Function>()
        .map_err(|_| JsValue::from_str(&format!("{} is not a function", name)))
}

/// Call a promise-returning method and await the result.
pub async fn call_async(
    target: &JsValue,
    name: &str,
    args: &[JsValue],
) -> std::result::Result<JsValue, JsValue> {
    let function = method(target, name)?;
    let args: Array = args.iter().collect();
    let promise: Promise = Reflect::apply(&function, target, &args)?.dyn_into()?;
    JsFuture::from(promise).await
}

/// `event.addListener(callback)`
pub fn add_listener(event: &JsValue, callback: &Function) -> std::result::Result<(), JsValue> {
    method(event, "addListener")?.call1(event, callback)?;
    Ok(())
}

/// `event.removeListener(callback)`
pub fn remove_listener(event: &JsValue, callback: &Function) -> std::result::Result<(), JsValue> {
    method(event, "removeListener")?.call1(event, callback)?;
    Ok(())
}

pub fn to_js(value: &Value) -> std::result::Result<JsValue, JsValue> {
    JSON::parse(&value.to_string())
}

pub fn from_js(value: &JsValue) -> std::result::Result<Value, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    let text: String = JSON::stringify(value)?.into();
    serde_json::from_str(&text).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Best-effort message of a thrown JS value.
pub fn error_message(err: &JsValue) -> String {
    if let Some(error) = err.dyn_ref::<js_sys::Error>() {
        return error.message().into();
    }
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

fn get_number(target: &JsValue, key: &str) -> Option<f64> {
    Reflect::get(target, &JsValue::from_str(key)).ok()?.as_f64()
}

fn get_string(target: &JsValue, key: &str) -> Option<String> {
    Reflect::get(target, &JsValue::from_str(key)).ok()?.as_string()
}

/// Tab id of a `runtime.MessageSender`, absent for non-tab senders.
pub fn sender_tab_id(sender: &JsValue) -> Option<TabId> {
    let tab = Reflect::get(sender, &JsValue::from_str("tab")).ok()?;
    if tab.is_undefined() || tab.is_null() {
        return None;
    }
    get_number(&tab, "id").map(|id| id as TabId)
}

/// `(tabId, frameId, url)` of a `webNavigation` event details object.
pub fn navigation_details(details: &JsValue) -> Option<(TabId, FrameId, String)> {
    let tab_id = get_number(details, "tabId")? as TabId;
    let frame_id = get_number(details, "frameId")? as FrameId;
    let url = get_string(details, "url")?;
    Some((tab_id, frame_id, url))
}

/// `(id, url)` of a `tabs.Tab`. The url is empty when the extension may
/// not see it.
pub fn tab_info(tab: &JsValue) -> Option<(TabId, String)> {
    let id = get_number(tab, "id")? as TabId;
    Some((id, get_string(tab, "url").unwrap_or_default()))
}

// =============================================================================
// Chrome Store
// =============================================================================

type ChangedCallback = Closure<dyn FnMut(JsValue, JsValue)>;

fn store_error(err: JsValue) -> Error {
    let message = error_message(&err);
    if message.contains("QUOTA_BYTES") {
        Error::QuotaExceeded
    } else {
        Error::store(message)
    }
}

/// [`Store`] over one `chrome.storage` area.
pub struct ChromeStore {
    namespace: Namespace,
    area: JsValue,
    listeners: RefCell<BTreeMap<SubscriptionId, ChangedCallback>>,
    next_id: Cell<u64>,
}

impl ChromeStore {
    pub fn new(namespace: Namespace) -> std::result::Result<Self, JsValue> {
        Ok(Self {
            namespace,
            area: api(&["chrome", "storage", namespace.as_str()])?,
            listeners: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(0),
        })
    }

    fn on_changed() -> std::result::Result<JsValue, JsValue> {
        api(&["chrome", "storage", "onChanged"])
    }
}

fn key_array(keys: &[&str]) -> Array {
    keys.iter().map(|k| JsValue::from_str(k)).collect()
}

impl Store for ChromeStore {
    fn namespace(&self) -> Namespace {
        self.namespace
    }

    async fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        let result = call_async(&self.area, "get", &[key_array(keys).into()])
            .await
            .map_err(store_error)?;
        match from_js(&result).map_err(store_error)? {
            Value::Object(items) => Ok(items),
            _ => Ok(StoreMap::new()),
        }
    }

    async fn set(&self, items: StoreMap) -> Result<()> {
        let items = to_js(&Value::Object(items)).map_err(store_error)?;
        call_async(&self.area, "set", &[items]).await.map_err(store_error)?;
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        call_async(&self.area, "remove", &[key_array(keys).into()])
            .await
            .map_err(store_error)?;
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let callback = Closure::wrap(Box::new(move |changes: JsValue, area: JsValue| {
            let Some(namespace) = area.as_string().and_then(|a| Namespace::from_area(&a)) else {
                return;
            };
            let decoded = from_js(&changes)
                .map_err(|e| error_message(&e))
                .and_then(|v| serde_json::from_value::<ChangeSet>(v).map_err(|e| e.to_string()));
            match decoded {
                Ok(changes) => listener(namespace, &changes),
                Err(e) => log::warn!("Ignoring undecodable storage change - {}", e),
            }
        }) as Box<dyn FnMut(JsValue, JsValue)>);

        match Self::on_changed().and_then(|event| add_listener(&event, callback.as_ref().unchecked_ref())) {
            Ok(()) => {
                self.listeners.borrow_mut().insert(id, callback);
            }
            Err(e) => log::error!("Error subscribing to storage changes - {}", error_message(&e)),
        }
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some(callback) = self.listeners.borrow_mut().remove(&id) else {
            return false;
        };
        if let Err(e) = Self::on_changed().and_then(|event| remove_listener(&event, callback.as_ref().unchecked_ref())) {
            log::error!("Error unsubscribing from storage changes - {}", error_message(&e));
        }
        true
    }
}
