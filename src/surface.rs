use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use gloo::console;
use gloo::events::{EventListener, EventListenerOptions, EventListenerPhase};
use gloo::timers::callback::Timeout;
use wasm_bindgen::JsCast;
use web_sys::{Document, Event, HtmlCanvasElement, Window};

use occt_viewer_core::{fit_to_display, BridgeError, DisplayMetrics, SurfaceSize};

/// Element id the emscripten runtime resolves its canvas by.
pub(crate) const CANVAS_ID: &str = "canvas";

/// Zero-delay turn used for the first post-readiness resize.
const DEFERRED_RESIZE_DELAY_MS: u32 = 0;

/// Drawing surface owned by the bridge: a focusable canvas sized to the
/// display with a backing store scaled by the device pixel ratio.
pub(crate) struct Surface {
    window: Window,
    canvas: HtmlCanvasElement,
    size: Cell<Option<SurfaceSize>>,
    listeners: RefCell<Vec<EventListener>>,
    ratio_listener: RefCell<Option<EventListener>>,
    deferred_resize: RefCell<Option<Timeout>>,
}

impl Surface {
    /// Creates the canvas and attaches it under `container_id`.
    pub(crate) fn create(container_id: &str) -> Result<Rc<Self>, BridgeError> {
        let attach_error = || BridgeError::Attach {
            container_id: container_id.to_string(),
        };
        let window = web_sys::window().ok_or_else(attach_error)?;
        let document = window.document().ok_or_else(attach_error)?;
        let container = document
            .get_element_by_id(container_id)
            .ok_or_else(attach_error)?;
        let canvas = create_canvas(&document).map_err(|_| attach_error())?;
        container
            .append_child(&canvas)
            .map_err(|_| attach_error())?;

        let surface = Rc::new(Self {
            window,
            canvas,
            size: Cell::new(None),
            listeners: RefCell::new(Vec::new()),
            ratio_listener: RefCell::new(None),
            deferred_resize: RefCell::new(None),
        });
        surface.attach_input_listeners();
        Ok(surface)
    }

    pub(crate) fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }

    pub(crate) fn focus(&self) {
        let _ = self.canvas.focus();
    }

    /// Re-fits the canvas to the current display. Returns whether anything
    /// changed; unchanged metrics leave the canvas untouched, since writing
    /// its width or height clears the drawing buffer.
    pub(crate) fn resize_to_display(&self) -> bool {
        let target = fit_to_display(&self.sample_metrics());
        if target.is_empty() {
            return false;
        }
        if self.size.get() == Some(target) {
            return false;
        }
        self.apply_size(&target);
        self.size.set(Some(target));
        true
    }

    /// Keeps the surface fitted while the window or pixel ratio changes.
    pub(crate) fn watch_display(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let listener = EventListener::new(&self.window, "resize", move |_event: &Event| {
            if let Some(surface) = weak.upgrade() {
                surface.resize_to_display();
            }
        });
        self.listeners.borrow_mut().push(listener);
        self.watch_pixel_ratio();
    }

    /// Runs the first resize after readiness on a later turn of the event
    /// loop: the canvas only reports its final layout once the insertion
    /// has settled. The runtime tracks size through window resize events,
    /// so a synthetic one is dispatched when the canvas actually changed.
    pub(crate) fn schedule_deferred_resize<F>(self: &Rc<Self>, after: F)
    where
        F: FnOnce(bool) + 'static,
    {
        let weak = Rc::downgrade(self);
        let timeout = Timeout::new(DEFERRED_RESIZE_DELAY_MS, move || {
            let Some(surface) = weak.upgrade() else {
                return;
            };
            after(surface.refit_and_notify());
        });
        // Replacing a pending task drops, and thereby cancels, it.
        *self.deferred_resize.borrow_mut() = Some(timeout);
    }

    /// Removes the canvas and drops every listener and pending task.
    pub(crate) fn detach(&self) {
        self.listeners.borrow_mut().clear();
        self.ratio_listener.borrow_mut().take();
        self.deferred_resize.borrow_mut().take();
        self.canvas.remove();
    }

    fn attach_input_listeners(self: &Rc<Self>) {
        let mut listeners = self.listeners.borrow_mut();
        listeners.push(EventListener::new_with_options(
            &self.canvas,
            "contextmenu",
            EventListenerOptions {
                phase: EventListenerPhase::Bubble,
                passive: false,
            },
            move |event: &Event| {
                event.prevent_default();
            },
        ));
        let weak: Weak<Self> = Rc::downgrade(self);
        listeners.push(EventListener::new(
            &self.canvas,
            "pointerdown",
            move |_event: &Event| {
                if let Some(surface) = weak.upgrade() {
                    surface.focus();
                }
            },
        ));
    }

    fn watch_pixel_ratio(self: &Rc<Self>) {
        let ratio = self.window.device_pixel_ratio();
        let query = format!("(resolution: {ratio}dppx)");
        let Ok(Some(media)) = self.window.match_media(&query) else {
            return;
        };
        let weak = Rc::downgrade(self);
        // A resolution query only reports leaving the current ratio, so it is
        // re-armed with the new ratio after every change.
        let listener = EventListener::once(&media, "change", move |_event: &Event| {
            let Some(surface) = weak.upgrade() else {
                return;
            };
            console::log!("surface: pixel ratio changed", surface.window.device_pixel_ratio());
            // No window resize accompanies a ratio change, so the runtime
            // has to be told explicitly.
            surface.refit_and_notify();
            // Re-arm outside the callback that owns this listener.
            wasm_bindgen_futures::spawn_local(async move {
                surface.watch_pixel_ratio();
            });
        });
        *self.ratio_listener.borrow_mut() = Some(listener);
    }

    fn sample_metrics(&self) -> DisplayMetrics {
        let window = &self.window;
        let screen = window.screen().ok();
        DisplayMetrics {
            window_width: js_number(window.inner_width()),
            window_height: js_number(window.inner_height()),
            screen_avail_width: screen
                .as_ref()
                .and_then(|screen| screen.avail_width().ok())
                .map(f64::from)
                .unwrap_or(f64::NAN),
            screen_avail_height: screen
                .as_ref()
                .and_then(|screen| screen.avail_height().ok())
                .map(f64::from)
                .unwrap_or(f64::NAN),
            device_pixel_ratio: window.device_pixel_ratio(),
        }
    }

    fn apply_size(&self, size: &SurfaceSize) {
        self.canvas.set_width(size.backing_width);
        self.canvas.set_height(size.backing_height);
        let style = self.canvas.style();
        let _ = style.set_property("width", &format!("{}px", size.logical_width));
        let _ = style.set_property("height", &format!("{}px", size.logical_height));
        console::log!(
            "surface: resized",
            format!(
                "{}x{} css, {}x{} backing @{}",
                size.logical_width,
                size.logical_height,
                size.backing_width,
                size.backing_height,
                size.device_pixel_ratio
            )
        );
    }

    /// Re-fits the canvas and, when it changed, dispatches a window
    /// `resize` so the runtime picks up the new backing size.
    fn refit_and_notify(&self) -> bool {
        let changed = self.resize_to_display();
        if changed {
            self.notify_display_change();
        }
        changed
    }

    fn notify_display_change(&self) {
        if let Ok(event) = Event::new("resize") {
            let _ = self.window.dispatch_event(&event);
        }
    }
}

fn create_canvas(document: &Document) -> Result<HtmlCanvasElement, wasm_bindgen::JsValue> {
    let canvas = document
        .create_element("canvas")?
        .dyn_into::<HtmlCanvasElement>()?;
    canvas.set_id(CANVAS_ID);
    canvas.set_tab_index(0);
    let _ = canvas.style().set_property("outline", "none");
    Ok(canvas)
}

fn js_number(value: Result<wasm_bindgen::JsValue, wasm_bindgen::JsValue>) -> f64 {
    value
        .ok()
        .and_then(|value| value.as_f64())
        .unwrap_or(f64::NAN)
}
