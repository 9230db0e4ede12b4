use gloo::console;
use js_sys::{Array, Function, Object, Promise, Reflect, Uint8Array};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

use occt_viewer_core::{
    BridgeError, GeometryRuntime, HeapOffset, RuntimeCallError, RuntimeCapabilities,
};

use crate::surface::Surface;

const EXPORT_OPEN_FROM_STRING: &str = "openFromString";
const EXPORT_OPEN_FROM_MEMORY: &str = "openFromMemory";
const EXPORT_OPEN_FROM_URL: &str = "openFromUrl";
const EXPORT_DISPLAY_GROUND: &str = "displayGround";
const EXPORT_MALLOC: &str = "_malloc";
const EXPORT_FREE: &str = "_free";
const EXPORT_HEAP: &str = "HEAPU8";

/// A live emscripten module instance with the capabilities probed on it.
pub(crate) struct JsRuntime {
    module: Object,
    capabilities: RuntimeCapabilities,
}

/// Instantiates the runtime exposed as `window[factory_name]` against the
/// surface's canvas. `on_ready` is handed to the module as its
/// `onRuntimeInitialized` hook.
pub(crate) async fn instantiate<F>(
    factory_name: &str,
    surface: &Surface,
    on_ready: F,
) -> Result<JsRuntime, BridgeError>
where
    F: FnOnce() + 'static,
{
    let factory = lookup_factory(factory_name)?;
    let config = Object::new();
    set_field(&config, "canvas", surface.canvas())?;
    let on_ready = Closure::once_into_js(on_ready);
    set_field(&config, "onRuntimeInitialized", &on_ready)?;

    let value = factory
        .call1(&JsValue::NULL, &config)
        .map_err(|err| init_error(format!("{factory_name} threw: {}", js_err(err))))?;
    let value = match value.dyn_into::<Promise>() {
        Ok(promise) => JsFuture::from(promise)
            .await
            .map_err(|err| init_error(format!("{factory_name} rejected: {}", js_err(err))))?,
        Err(value) => value,
    };
    let module = value
        .dyn_into::<Object>()
        .map_err(|_| init_error(format!("{factory_name} did not produce a module")))?;
    JsRuntime::probe(module)
}

impl JsRuntime {
    /// Inspects a freshly created module. Every instance is probed on its
    /// own since runtime builds differ in what they export. The memory path
    /// needs the full allocator pair, or a failed copy could not be undone.
    pub(crate) fn probe(module: Object) -> Result<Self, BridgeError> {
        let has_content_open = export_fn(&module, EXPORT_OPEN_FROM_STRING).is_some();
        let has_memory_open = export_fn(&module, EXPORT_OPEN_FROM_MEMORY).is_some()
            && export_fn(&module, EXPORT_MALLOC).is_some()
            && export_fn(&module, EXPORT_FREE).is_some()
            && heap_view(&module).is_some();
        if !has_content_open && !has_memory_open {
            return Err(init_error("runtime exposes no open entry point".to_string()));
        }
        let capabilities = RuntimeCapabilities {
            supports_raw_memory_transfer: has_memory_open,
        };
        console::log!(
            "runtime: ready",
            capabilities.strategy().label()
        );
        Ok(Self {
            module,
            capabilities,
        })
    }

    fn call(&self, entry_point: &'static str, args: &[JsValue]) -> Result<JsValue, RuntimeCallError> {
        let func = export_fn(&self.module, entry_point)
            .ok_or_else(|| RuntimeCallError::new(entry_point, "entry point missing"))?;
        let array = Array::new();
        for arg in args {
            array.push(arg);
        }
        func.apply(&self.module, &array)
            .map_err(|err| RuntimeCallError::new(entry_point, js_err(err)))
    }
}

impl GeometryRuntime for JsRuntime {
    fn capabilities(&self) -> RuntimeCapabilities {
        self.capabilities
    }

    fn open_from_content(&self, name: &str, bytes: &[u8]) -> Result<bool, RuntimeCallError> {
        let content = Uint8Array::from(bytes);
        let result = self.call(
            EXPORT_OPEN_FROM_STRING,
            &[JsValue::from_str(name), content.into()],
        )?;
        Ok(accepted(&result))
    }

    fn allocate(&self, len: usize) -> Result<HeapOffset, RuntimeCallError> {
        let result = self.call(EXPORT_MALLOC, &[JsValue::from_f64(len as f64)])?;
        let offset = result
            .as_f64()
            .ok_or_else(|| RuntimeCallError::new(EXPORT_MALLOC, "returned a non-numeric pointer"))?;
        Ok(offset as HeapOffset)
    }

    fn write_heap(&self, offset: HeapOffset, bytes: &[u8]) -> Result<(), RuntimeCallError> {
        // Memory growth swaps the view out, so it is fetched after allocating.
        let heap = heap_view(&self.module)
            .ok_or_else(|| RuntimeCallError::new(EXPORT_HEAP, "heap view missing"))?;
        let start = offset;
        let end = u32::try_from(bytes.len())
            .ok()
            .and_then(|len| start.checked_add(len))
            .filter(|end| *end <= heap.length())
            .ok_or_else(|| {
                RuntimeCallError::new(
                    EXPORT_HEAP,
                    format!("{} bytes at {start} exceed the heap", bytes.len()),
                )
            })?;
        heap.subarray(start, end).copy_from(bytes);
        Ok(())
    }

    fn release(&self, offset: HeapOffset) -> Result<(), RuntimeCallError> {
        self.call(EXPORT_FREE, &[JsValue::from_f64(offset as f64)])?;
        Ok(())
    }

    fn open_from_memory(
        &self,
        name: &str,
        offset: HeapOffset,
        len: usize,
        take_ownership: bool,
    ) -> Result<bool, RuntimeCallError> {
        let result = self.call(
            EXPORT_OPEN_FROM_MEMORY,
            &[
                JsValue::from_str(name),
                JsValue::from_f64(offset as f64),
                JsValue::from_f64(len as f64),
                JsValue::from_bool(take_ownership),
            ],
        )?;
        Ok(accepted(&result))
    }

    fn open_from_url(&self, name: &str, url: &str) -> Result<(), RuntimeCallError> {
        self.call(
            EXPORT_OPEN_FROM_URL,
            &[JsValue::from_str(name), JsValue::from_str(url)],
        )?;
        Ok(())
    }

    fn display_ground(&self, visible: bool) -> Result<(), RuntimeCallError> {
        if export_fn(&self.module, EXPORT_DISPLAY_GROUND).is_none() {
            console::warn!("runtime: no reference plane toggle, skipping");
            return Ok(());
        }
        self.call(EXPORT_DISPLAY_GROUND, &[JsValue::from_bool(visible)])?;
        Ok(())
    }
}

/// Open entry points return a bool; builds whose open is void count as
/// having accepted the model.
fn accepted(result: &JsValue) -> bool {
    result.as_bool().unwrap_or(true)
}

fn lookup_factory(factory_name: &str) -> Result<Function, BridgeError> {
    let window = web_sys::window().ok_or_else(|| init_error("missing window".to_string()))?;
    Reflect::get(&window, &JsValue::from_str(factory_name))
        .ok()
        .and_then(|value| value.dyn_into::<Function>().ok())
        .ok_or_else(|| init_error(format!("runtime factory '{factory_name}' not found")))
}

fn set_field(target: &Object, key: &str, value: &JsValue) -> Result<(), BridgeError> {
    Reflect::set(target, &JsValue::from_str(key), value)
        .map(|_| ())
        .map_err(|err| init_error(js_err(err)))
}

fn export_fn(module: &Object, name: &str) -> Option<Function> {
    Reflect::get(module, &JsValue::from_str(name))
        .ok()
        .and_then(|value| value.dyn_into::<Function>().ok())
}

fn heap_view(module: &Object) -> Option<Uint8Array> {
    Reflect::get(module, &JsValue::from_str(EXPORT_HEAP))
        .ok()
        .and_then(|value| value.dyn_into::<Uint8Array>().ok())
}

fn init_error(reason: String) -> BridgeError {
    BridgeError::RuntimeInit { reason }
}

pub(crate) fn js_err(error: JsValue) -> String {
    if let Some(value) = error.as_string() {
        return value;
    }
    if let Some(error) = error.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    if let Ok(json) = js_sys::JSON::stringify(&error) {
        if let Some(value) = json.as_string() {
            return value;
        }
    }
    "js error".to_string()
}
