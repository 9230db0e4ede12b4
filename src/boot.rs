use gloo::console;
use js_sys::{Array, Function, Object, Reflect};
use wasm_bindgen::{JsCast, JsValue};

use occt_viewer_core::BridgeError;

use crate::runtime::js_err;

/// Global the host page's loading overlay installs itself under.
pub(crate) const BOOT_GLOBAL: &str = "__OCCT_BOOT";

/// Reports a startup phase (`Surface`, `Runtime`) to the overlay.
pub(crate) fn set_phase(label: &str, detail: &str) {
    invoke("setPhase", &[label.into(), detail.into()]);
}

/// Shows a fatal startup error with its stable code and a hint.
pub(crate) fn fail(error: &BridgeError) {
    invoke(
        "fail",
        &[
            error.code().into(),
            error.to_string().into(),
            error.hint().into(),
        ],
    );
}

/// Dismisses the overlay. Called once per controller, on runtime readiness.
pub(crate) fn ready() {
    invoke("ready", &[]);
}

fn overlay() -> Option<Object> {
    let window = web_sys::window()?;
    Reflect::get(&window, &JsValue::from_str(BOOT_GLOBAL))
        .ok()?
        .dyn_into::<Object>()
        .ok()
}

/// Pages without an overlay, or overlays lacking a hook, are skipped.
fn invoke(method: &str, args: &[JsValue]) {
    let Some(overlay) = overlay() else {
        return;
    };
    let Some(hook) = Reflect::get(&overlay, &JsValue::from_str(method))
        .ok()
        .and_then(|value| value.dyn_into::<Function>().ok())
    else {
        return;
    };
    let args: Array = args.iter().collect();
    if let Err(err) = hook.apply(&overlay, &args) {
        console::warn!("boot: overlay hook failed", method, js_err(err));
    }
}
