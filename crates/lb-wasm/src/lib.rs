//! WebAssembly bindings for LuffyBlocker
//!
//! Each extension surface loads this module and calls its entry point:
//! [`start_background`] from the service worker, [`start_content`] from the
//! content script and [`start_popup`] from the popup page. The logic lives
//! in `lb-core`; this crate only adapts the `chrome.*` APIs and the DOM.

use wasm_bindgen::prelude::*;

pub mod background;
pub mod chrome;
pub mod content;
pub mod logger;
pub mod popup;

pub use background::start_background;
pub use content::start_content;
pub use popup::start_popup;

/// Set the console log level (`error`, `warn`, `info`, `debug`, `trace` or
/// `off`). Installs the console logger on first use.
#[wasm_bindgen]
pub fn set_log_level(level: &str) -> Result<(), JsValue> {
    let filter = level
        .parse::<log::LevelFilter>()
        .map_err(|_| JsValue::from_str(&format!("Unknown log level: {}", level)))?;
    logger::init(filter);
    Ok(())
}

/// Common startup for every surface.
pub(crate) fn install_hooks() {
    console_error_panic_hook::set_once();
    logger::install(log::LevelFilter::Info);
}

pub(crate) fn core_error(e: lb_core::Error) -> JsValue {
    JsValue::from_str(&e.to_string())
}
