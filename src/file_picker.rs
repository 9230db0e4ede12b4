use gloo::timers::callback::Timeout;
use js_sys::Promise;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{AddEventListenerOptions, Event, File, HtmlInputElement};

use occt_viewer_core::{BridgeError, FileFilter, SelectedFile};

/// Grace period after the window regains focus before a picker that
/// produced no file is treated as dismissed, for browsers without `cancel`.
const FOCUS_CANCEL_GRACE_MS: u32 = 500;

#[derive(Debug)]
pub(crate) enum PickOutcome {
    Selected(SelectedFile),
    Cancelled,
}

/// Opens a single-selection file dialog restricted to `filter` and reads
/// the chosen file fully into memory.
pub(crate) async fn pick_file(filter: &FileFilter) -> Result<PickOutcome, BridgeError> {
    let input = create_input(filter).map_err(|err| BridgeError::FileRead {
        name: String::new(),
        reason: format!("file picker unavailable: {}", crate::runtime::js_err(err)),
    })?;
    let selection = selection_promise(&input);
    input.click();
    let value = JsFuture::from(selection).await.unwrap_or(JsValue::NULL);
    input.remove();

    let Ok(file) = value.dyn_into::<File>() else {
        return Ok(PickOutcome::Cancelled);
    };
    let name = file.name();
    if !filter.matches(&name) {
        return Err(BridgeError::FileRead {
            name,
            reason: "unsupported file type".to_string(),
        });
    }
    let bytes = read_file_bytes(&file)
        .await
        .map_err(|reason| BridgeError::FileRead {
            name: name.clone(),
            reason,
        })?;
    Ok(PickOutcome::Selected(SelectedFile::new(name, bytes)))
}

pub(crate) async fn read_file_bytes(file: &File) -> Result<Vec<u8>, String> {
    let buffer = JsFuture::from(file.array_buffer())
        .await
        .map_err(|_| "failed to read file".to_string())?;
    let array = js_sys::Uint8Array::new(&buffer);
    Ok(array.to_vec())
}

fn create_input(filter: &FileFilter) -> Result<HtmlInputElement, JsValue> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let input = document
        .create_element("input")?
        .dyn_into::<HtmlInputElement>()?;
    input.set_type("file");
    input.set_multiple(false);
    if !filter.is_unrestricted() {
        input.set_accept(&filter.accept_attribute());
    }
    let _ = input.style().set_property("display", "none");
    if let Some(body) = document.body() {
        body.append_child(&input)?;
    }
    Ok(input)
}

/// Resolves with the chosen `File`, or `null` once the dialog is dismissed.
fn selection_promise(input: &HtmlInputElement) -> Promise {
    Promise::new(&mut |resolve, _reject| {
        let change_input = input.clone();
        let change_resolve = resolve.clone();
        let on_change = Closure::once(move |_event: Event| {
            let selected = change_input
                .files()
                .and_then(|files| files.get(0))
                .map(JsValue::from)
                .unwrap_or(JsValue::NULL);
            let _ = change_resolve.call1(&JsValue::NULL, &selected);
        });
        let cancel_resolve = resolve.clone();
        let on_cancel = Closure::once(move |_event: Event| {
            let _ = cancel_resolve.call1(&JsValue::NULL, &JsValue::NULL);
        });
        let options = AddEventListenerOptions::new();
        options.set_once(true);
        let _ = input.add_event_listener_with_callback_and_add_event_listener_options(
            "change",
            on_change.as_ref().unchecked_ref(),
            &options,
        );
        let _ = input.add_event_listener_with_callback_and_add_event_listener_options(
            "cancel",
            on_cancel.as_ref().unchecked_ref(),
            &options,
        );
        on_change.forget();
        on_cancel.forget();

        let Some(window) = web_sys::window() else {
            return;
        };
        let focus_input = input.clone();
        let on_focus = Closure::once(move |_event: Event| {
            // Resolving an already settled promise is a no-op.
            Timeout::new(FOCUS_CANCEL_GRACE_MS, move || {
                let chosen = focus_input
                    .files()
                    .map(|files| files.length() > 0)
                    .unwrap_or(false);
                if !chosen {
                    let _ = resolve.call1(&JsValue::NULL, &JsValue::NULL);
                }
            })
            .forget();
        });
        let _ = window.add_event_listener_with_callback_and_add_event_listener_options(
            "focus",
            on_focus.as_ref().unchecked_ref(),
            &options,
        );
        on_focus.forget();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gloo::timers::future::TimeoutFuture;
    use js_sys::Date;
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen_futures::spawn_local;
    use wasm_bindgen_test::*;
    use web_sys::Element;

    wasm_bindgen_test_configure!(run_in_browser);

    async fn wait_for_input() -> Element {
        let document = web_sys::window().unwrap().document().unwrap();
        let start = Date::now();
        loop {
            if let Ok(Some(input)) = document.query_selector("input[type=file]") {
                return input;
            }
            assert!(Date::now() - start < 5000.0, "file input not created");
            TimeoutFuture::new(10).await;
        }
    }

    #[wasm_bindgen_test(async)]
    async fn dismissed_dialog_is_cancelled() {
        let filter = FileFilter::parse(".stp,.step");
        let outcome = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&outcome);
        spawn_local(async move {
            let picked = pick_file(&filter).await;
            *sink.borrow_mut() = Some(picked);
        });

        let input = wait_for_input().await;
        let input: HtmlInputElement = input.dyn_into().unwrap();
        assert_eq!(input.accept(), ".stp,.step");
        assert!(!input.multiple());
        input
            .dispatch_event(&Event::new("cancel").unwrap())
            .unwrap();

        let start = Date::now();
        while outcome.borrow().is_none() {
            assert!(Date::now() - start < 5000.0, "picker never settled");
            TimeoutFuture::new(10).await;
        }
        assert!(matches!(
            outcome.borrow_mut().take(),
            Some(Ok(PickOutcome::Cancelled))
        ));
        assert!(!input.is_connected());
    }
}
