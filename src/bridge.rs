use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use gloo::console;

use occt_viewer_core::{
    ingest, open_url, BridgeError, BridgePhase, Lifecycle, LoadedModel, SelectedFile,
};

use crate::app_config::ViewerConfig;
use crate::boot;
use crate::file_picker::{self, PickOutcome};
use crate::runtime::{self, JsRuntime};
use crate::surface::Surface;

pub(crate) type PhaseHook = Rc<dyn Fn(BridgePhase)>;

/// Owns the surface and the runtime handle for one hosting view and
/// sequences every operation the menu or router may trigger.
pub(crate) struct BridgeController {
    config: ViewerConfig,
    lifecycle: RefCell<Lifecycle>,
    surface: RefCell<Option<Rc<Surface>>>,
    runtime: RefCell<Option<Rc<JsRuntime>>>,
    loaded_model: RefCell<Option<String>>,
    last_error: RefCell<Option<BridgeError>>,
    phase_hook: RefCell<Option<PhaseHook>>,
}

impl BridgeController {
    pub(crate) fn new(config: ViewerConfig) -> Rc<Self> {
        Rc::new(Self {
            config,
            lifecycle: RefCell::new(Lifecycle::new()),
            surface: RefCell::new(None),
            runtime: RefCell::new(None),
            loaded_model: RefCell::new(None),
            last_error: RefCell::new(None),
            phase_hook: RefCell::new(None),
        })
    }

    pub(crate) fn set_phase_hook(&self, hook: Option<PhaseHook>) {
        *self.phase_hook.borrow_mut() = hook;
    }

    pub(crate) fn phase(&self) -> BridgePhase {
        self.lifecycle.borrow().phase()
    }

    /// Name of the most recently loaded model.
    pub(crate) fn loaded_model(&self) -> Option<String> {
        self.loaded_model.borrow().clone()
    }

    pub(crate) fn last_error(&self) -> Option<BridgeError> {
        self.last_error.borrow().clone()
    }

    /// Attaches the surface and starts the runtime. Resolves once the
    /// runtime is ready or startup has failed. Only the first call on a
    /// fresh controller does anything; the surface is created at most once.
    pub(crate) async fn start(self: &Rc<Self>) -> Result<(), BridgeError> {
        match self.phase() {
            BridgePhase::Uninitialized => {}
            BridgePhase::Disposed => return Err(BridgeError::Disposed),
            phase => return Err(BridgeError::NotReady { phase }),
        }
        boot::set_phase("Surface", "attaching viewer surface");
        let surface = match Surface::create(&self.config.container_id) {
            Ok(surface) => surface,
            Err(err) => return Err(self.report(err)),
        };
        surface.resize_to_display();
        surface.watch_display();
        *self.surface.borrow_mut() = Some(Rc::clone(&surface));
        self.transition(Lifecycle::surface_created)?;

        boot::set_phase("Runtime", "loading geometry runtime");
        self.transition(Lifecycle::begin_runtime_load)?;
        let loaded = runtime::instantiate(&self.config.runtime_factory, &surface, || {
            console::log!("runtime: initialized");
        })
        .await;
        if self.lifecycle.borrow().is_disposed() {
            return Err(BridgeError::Disposed);
        }
        let runtime = match loaded {
            Ok(runtime) => Rc::new(runtime),
            Err(err) => {
                let _ = self.transition(Lifecycle::runtime_failed);
                return Err(self.report(err));
            }
        };
        *self.runtime.borrow_mut() = Some(runtime);
        self.transition(Lifecycle::runtime_ready)?;
        boot::ready();

        let bridge = Rc::downgrade(self);
        surface.schedule_deferred_resize(move |changed| {
            if changed {
                console::log!("surface: settled after runtime start");
            }
            let Some(bridge) = bridge.upgrade() else {
                return;
            };
            bridge.focus_surface();
        });

        if let Some(model) = self.config.startup_model.clone() {
            if let Err(err) = self.open_url(&model.name, &model.url) {
                console::warn!("bridge: startup model failed", err.to_string());
            }
        }
        Ok(())
    }

    /// The dock's "CAD" action: pick a file and deliver it to the runtime.
    /// Resolves with `None` when the picker is dismissed.
    pub(crate) async fn open_cad(self: &Rc<Self>) -> Result<Option<LoadedModel>, BridgeError> {
        let filter = self.config.filter.clone();
        self.open_picked(async move { file_picker::pick_file(&filter).await })
            .await
    }

    /// Holds the load slot across `pick`, so nothing else reaches the
    /// runtime while the dialog is open.
    async fn open_picked<P>(self: &Rc<Self>, pick: P) -> Result<Option<LoadedModel>, BridgeError>
    where
        P: Future<Output = Result<PickOutcome, BridgeError>>,
    {
        self.transition(Lifecycle::begin_file_load)?;
        let outcome = match pick.await {
            Ok(PickOutcome::Selected(file)) => self.deliver(file).map(Some),
            Ok(PickOutcome::Cancelled) => {
                console::log!("ingest: picker dismissed");
                self.last_error.borrow_mut().take();
                Ok(None)
            }
            Err(err) => Err(err),
        };
        let _ = self.transition(Lifecycle::finish_file_load);
        outcome.map_err(|err| self.report(err))
    }

    /// Delivers an already read file, gated like `open_cad`.
    pub(crate) fn open_file(&self, file: SelectedFile) -> Result<LoadedModel, BridgeError> {
        self.transition(Lifecycle::begin_file_load)?;
        let outcome = self.deliver(file);
        let _ = self.transition(Lifecycle::finish_file_load);
        outcome.map_err(|err| self.report(err))
    }

    /// Hands a URL to the runtime, which fetches and opens it itself.
    pub(crate) fn open_url(&self, name: &str, url: &str) -> Result<(), BridgeError> {
        self.transition(Lifecycle::begin_file_load)?;
        let outcome = self.runtime_handle().and_then(|runtime| {
            console::log!("ingest: opening url", url);
            open_url(runtime.as_ref(), name, url)
        });
        let outcome = outcome.map(|plane_error| {
            if let Some(err) = plane_error {
                console::warn!("ingest: reference plane left visible", err.to_string());
            }
            self.loaded(name.to_string());
        });
        let _ = self.transition(Lifecycle::finish_file_load);
        outcome.map_err(|err| self.report(err))
    }

    /// Tears the view down. The runtime handle is invalid from here on.
    pub(crate) fn dispose(&self) {
        if self.lifecycle.borrow().is_disposed() {
            return;
        }
        self.lifecycle.borrow_mut().dispose();
        if let Some(surface) = self.surface.borrow_mut().take() {
            surface.detach();
        }
        self.runtime.borrow_mut().take();
        console::log!("bridge: disposed");
        self.notify(BridgePhase::Disposed);
    }

    fn deliver(&self, file: SelectedFile) -> Result<LoadedModel, BridgeError> {
        let runtime = self.runtime_handle()?;
        console::log!("ingest: transferring", file.name(), file.len() as f64);
        let model = ingest(runtime.as_ref(), file)?;
        console::log!(
            "ingest: loaded",
            model.name.clone(),
            model.format.label(),
            model.strategy.label()
        );
        if let Some(err) = &model.plane_error {
            console::warn!("ingest: reference plane left visible", err.to_string());
        }
        self.loaded(model.name.clone());
        Ok(model)
    }

    /// Records a successful load; a stale error from an earlier attempt no
    /// longer describes the view.
    fn loaded(&self, name: String) {
        *self.loaded_model.borrow_mut() = Some(name);
        self.last_error.borrow_mut().take();
        self.focus_surface();
    }

    fn runtime_handle(&self) -> Result<Rc<JsRuntime>, BridgeError> {
        let phase = self.phase();
        if phase == BridgePhase::Disposed {
            return Err(BridgeError::Disposed);
        }
        self.runtime
            .borrow()
            .clone()
            .ok_or(BridgeError::NotReady { phase })
    }

    fn focus_surface(&self) {
        if let Some(surface) = self.surface.borrow().as_ref() {
            surface.focus();
        }
    }

    fn transition(
        &self,
        step: impl FnOnce(&mut Lifecycle) -> Result<(), BridgeError>,
    ) -> Result<(), BridgeError> {
        let phase = {
            let mut lifecycle = self.lifecycle.borrow_mut();
            step(&mut lifecycle)?;
            lifecycle.phase()
        };
        self.notify(phase);
        Ok(())
    }

    fn notify(&self, phase: BridgePhase) {
        let hook = self.phase_hook.borrow().clone();
        if let Some(hook) = hook {
            hook(phase);
        }
    }

    /// Logs and records a failure; fatal ones also reach the boot overlay.
    fn report(&self, err: BridgeError) -> BridgeError {
        if err.is_fatal() {
            console::error!("bridge: startup failed", err.to_string());
            boot::fail(&err);
        } else {
            console::warn!("bridge: load failed", err.to_string());
        }
        *self.last_error.borrow_mut() = Some(err.clone());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{build_viewer_config, QueryOverrides};
    use crate::boot::tests::{install_fake_overlay, overlay_calls, remove_fake_overlay};
    use crate::runtime::tests::{call_name, install_fake_factory, recorded_calls};
    use js_sys::{Array, Reflect, Uint8Array};
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::*;
    use web_sys::Element;

    wasm_bindgen_test_configure!(run_in_browser);

    fn config(container_id: &str, factory: &str) -> ViewerConfig {
        let mut config = build_viewer_config(QueryOverrides::default());
        config.container_id = container_id.to_string();
        config.runtime_factory = factory.to_string();
        config
    }

    fn mount_container(id: &str) -> Element {
        let document = web_sys::window().unwrap().document().unwrap();
        let container = document.create_element("div").unwrap();
        container.set_id(id);
        document.body().unwrap().append_child(&container).unwrap();
        container
    }

    fn fake_module(factory: &str) -> JsValue {
        let window = web_sys::window().unwrap();
        Reflect::get(&window, &JsValue::from_str(&format!("{factory}Module"))).unwrap()
    }

    fn brep_payload(len: usize) -> Vec<u8> {
        let mut bytes = b"DBRep_DrawableShape\n".to_vec();
        bytes.extend((0..len).map(|idx| (idx % 251) as u8));
        bytes.truncate(len);
        bytes
    }

    fn set_accepting(factory: &str, accept: bool) {
        let window = web_sys::window().unwrap();
        Reflect::set(
            &window,
            &JsValue::from_str(&format!("{factory}Accept")),
            &JsValue::from_bool(accept),
        )
        .unwrap();
    }

    #[wasm_bindgen_test(async)]
    async fn missing_container_never_invokes_loader() {
        install_fake_factory("FakeOccMissing", true);
        install_fake_overlay();
        let bridge = BridgeController::new(config("bridge-test-missing", "FakeOccMissing"));
        let err = bridge.start().await.unwrap_err();
        assert!(matches!(err, BridgeError::Attach { .. }));
        assert_eq!(bridge.phase(), BridgePhase::Uninitialized);
        assert!(recorded_calls("FakeOccMissing").is_empty());
        assert_eq!(bridge.last_error(), Some(err));
        assert_eq!(
            overlay_calls(),
            vec![
                ("setPhase".to_string(), Some("Surface".to_string())),
                ("fail".to_string(), Some("attach".to_string())),
            ]
        );
        remove_fake_overlay();
    }

    #[wasm_bindgen_test(async)]
    async fn successful_start_dismisses_overlay() {
        install_fake_factory("FakeOccOverlay", true);
        install_fake_overlay();
        let container = mount_container("bridge-test-overlay");
        let bridge = BridgeController::new(config("bridge-test-overlay", "FakeOccOverlay"));
        bridge.start().await.unwrap();
        assert_eq!(
            overlay_calls(),
            vec![
                ("setPhase".to_string(), Some("Surface".to_string())),
                ("setPhase".to_string(), Some("Runtime".to_string())),
                ("ready".to_string(), None),
            ]
        );
        remove_fake_overlay();
        bridge.dispose();
        container.remove();
    }

    #[wasm_bindgen_test(async)]
    async fn second_start_keeps_a_single_surface() {
        install_fake_factory("FakeOccTwice", true);
        let container = mount_container("bridge-test-twice");
        let bridge = BridgeController::new(config("bridge-test-twice", "FakeOccTwice"));
        bridge.start().await.unwrap();
        assert_eq!(
            bridge.start().await,
            Err(BridgeError::NotReady {
                phase: BridgePhase::RuntimeReady
            })
        );
        assert_eq!(container.child_element_count(), 1);
        assert_eq!(bridge.phase(), BridgePhase::RuntimeReady);
        assert!(bridge.last_error().is_none());
        let factory_calls = recorded_calls("FakeOccTwice")
            .iter()
            .filter(|call| call_name(call) == "factory")
            .count();
        assert_eq!(factory_calls, 1);

        bridge.dispose();
        assert_eq!(bridge.start().await, Err(BridgeError::Disposed));
        assert_eq!(container.child_element_count(), 0);
        container.remove();
    }

    #[wasm_bindgen_test(async)]
    async fn successful_load_clears_previous_error() {
        install_fake_factory("FakeOccRetry", false);
        let container = mount_container("bridge-test-retry");
        let bridge = BridgeController::new(config("bridge-test-retry", "FakeOccRetry"));
        bridge.start().await.unwrap();

        set_accepting("FakeOccRetry", false);
        let payload = b"ISO-10303-21;\nHEADER;\n".to_vec();
        let err = bridge
            .open_file(SelectedFile::new("model.step", payload.clone()))
            .unwrap_err();
        assert!(matches!(err, BridgeError::RuntimeTransfer { .. }));
        assert_eq!(bridge.last_error(), Some(err));
        assert_eq!(bridge.phase(), BridgePhase::RuntimeReady);

        set_accepting("FakeOccRetry", true);
        bridge
            .open_file(SelectedFile::new("model.step", payload))
            .unwrap();
        assert!(bridge.last_error().is_none());
        assert_eq!(bridge.loaded_model().as_deref(), Some("model.step"));

        bridge.dispose();
        container.remove();
    }

    #[wasm_bindgen_test(async)]
    async fn dismissed_picker_returns_to_ready() {
        install_fake_factory("FakeOccDismiss", true);
        let container = mount_container("bridge-test-dismiss");
        let bridge = BridgeController::new(config("bridge-test-dismiss", "FakeOccDismiss"));
        bridge.start().await.unwrap();

        let during_pick = Rc::clone(&bridge);
        let outcome = bridge
            .open_picked(async move {
                assert_eq!(during_pick.phase(), BridgePhase::FileLoading);
                let competing = SelectedFile::new("part.brep", brep_payload(16));
                assert_eq!(
                    during_pick.open_file(competing),
                    Err(BridgeError::Busy {
                        phase: BridgePhase::FileLoading
                    })
                );
                Ok(PickOutcome::Cancelled)
            })
            .await;

        assert_eq!(outcome, Ok(None));
        assert_eq!(bridge.phase(), BridgePhase::RuntimeReady);
        assert!(bridge.last_error().is_none());
        assert!(bridge.loaded_model().is_none());
        let names: Vec<String> = recorded_calls("FakeOccDismiss").iter().map(call_name).collect();
        assert_eq!(names, vec!["factory"]);

        bridge.dispose();
        container.remove();
    }

    #[wasm_bindgen_test(async)]
    async fn picker_failure_is_recorded_and_releases_slot() {
        install_fake_factory("FakeOccPickFail", true);
        let container = mount_container("bridge-test-pickfail");
        let bridge = BridgeController::new(config("bridge-test-pickfail", "FakeOccPickFail"));
        bridge.start().await.unwrap();

        let unreadable = BridgeError::FileRead {
            name: "notes.txt".to_string(),
            reason: "unsupported file type".to_string(),
        };
        let expected = unreadable.clone();
        let outcome = bridge.open_picked(async move { Err(unreadable) }).await;
        assert_eq!(outcome, Err(expected.clone()));
        assert_eq!(bridge.last_error(), Some(expected));
        assert_eq!(bridge.phase(), BridgePhase::RuntimeReady);

        bridge.dispose();
        container.remove();
    }

    #[wasm_bindgen_test(async)]
    async fn missing_factory_is_runtime_init_error() {
        let container = mount_container("bridge-test-nofactory");
        let bridge = BridgeController::new(config("bridge-test-nofactory", "NoSuchOccFactory"));
        let err = bridge.start().await.unwrap_err();
        assert!(matches!(err, BridgeError::RuntimeInit { .. }));
        assert_eq!(bridge.phase(), BridgePhase::RuntimeFailed);
        let file = SelectedFile::new("model.step", b"ISO-10303-21;".to_vec());
        assert!(matches!(
            bridge.open_file(file),
            Err(BridgeError::NotReady { phase: BridgePhase::RuntimeFailed })
        ));
        bridge.dispose();
        container.remove();
    }

    #[wasm_bindgen_test(async)]
    async fn memory_runtime_receives_exact_bytes() {
        install_fake_factory("FakeOccMemory", true);
        let container = mount_container("bridge-test-memory");
        let bridge = BridgeController::new(config("bridge-test-memory", "FakeOccMemory"));
        bridge.start().await.unwrap();
        assert_eq!(bridge.phase(), BridgePhase::RuntimeReady);

        let payload = brep_payload(1024);
        let model = bridge
            .open_file(SelectedFile::new("part.brep", payload.clone()))
            .unwrap();
        assert_eq!(model.length, 1024);
        assert_eq!(bridge.phase(), BridgePhase::RuntimeReady);
        assert_eq!(bridge.loaded_model().as_deref(), Some("part.brep"));

        let calls = recorded_calls("FakeOccMemory");
        let names: Vec<String> = calls.iter().map(call_name).collect();
        assert_eq!(
            names,
            vec!["factory", "_malloc", "openFromMemory", "displayGround"]
        );
        let open = Array::from(&calls[2]);
        let offset = open.get(2).as_f64().unwrap() as u32;
        assert_eq!(open.get(3).as_f64(), Some(1024.0));
        assert_eq!(open.get(4).as_bool(), Some(true));
        assert_eq!(Array::from(&calls[3]).get(1).as_bool(), Some(false));

        let heap = Reflect::get(&fake_module("FakeOccMemory"), &JsValue::from_str("HEAPU8")).unwrap();
        let heap = Uint8Array::new(&heap);
        assert_eq!(heap.subarray(offset, offset + 1024).to_vec(), payload);

        let document = web_sys::window().unwrap().document().unwrap();
        let active = document.active_element().unwrap();
        assert_eq!(active.id(), crate::surface::CANVAS_ID);

        bridge.dispose();
        container.remove();
    }

    #[wasm_bindgen_test(async)]
    async fn content_runtime_opens_by_name() {
        install_fake_factory("FakeOccContent", false);
        let container = mount_container("bridge-test-content");
        let bridge = BridgeController::new(config("bridge-test-content", "FakeOccContent"));
        bridge.start().await.unwrap();

        let payload = b"ISO-10303-21;\nHEADER;\nENDSEC;\n".to_vec();
        bridge
            .open_file(SelectedFile::new("model.step", payload.clone()))
            .unwrap();

        let calls = recorded_calls("FakeOccContent");
        let names: Vec<String> = calls.iter().map(call_name).collect();
        assert_eq!(names, vec!["factory", "openFromString", "displayGround"]);
        let open = Array::from(&calls[1]);
        assert_eq!(open.get(1).as_string().as_deref(), Some("model.step"));
        let sent: Vec<u8> = Array::from(&open.get(2))
            .iter()
            .map(|value| value.as_f64().unwrap() as u8)
            .collect();
        assert_eq!(sent, payload);

        bridge.dispose();
        container.remove();
    }

    #[wasm_bindgen_test(async)]
    async fn dispose_invalidates_handle() {
        install_fake_factory("FakeOccDispose", true);
        let container = mount_container("bridge-test-dispose");
        let bridge = BridgeController::new(config("bridge-test-dispose", "FakeOccDispose"));
        let phases = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&phases);
        bridge.set_phase_hook(Some(Rc::new(move |phase| sink.borrow_mut().push(phase))));
        bridge.start().await.unwrap();
        bridge.dispose();

        assert_eq!(
            *phases.borrow(),
            vec![
                BridgePhase::SurfaceReady,
                BridgePhase::RuntimeLoading,
                BridgePhase::RuntimeReady,
                BridgePhase::Disposed,
            ]
        );
        assert!(container.first_child().is_none());
        let file = SelectedFile::new("part.brep", brep_payload(16));
        assert_eq!(bridge.open_file(file), Err(BridgeError::Disposed));
        assert_eq!(bridge.open_url("gear", "gear.brep"), Err(BridgeError::Disposed));
        container.remove();
    }

    #[wasm_bindgen_test(async)]
    async fn startup_model_is_opened_by_url() {
        install_fake_factory("FakeOccUrl", false);
        let container = mount_container("bridge-test-url");
        let mut config = config("bridge-test-url", "FakeOccUrl");
        config.startup_model = Some(crate::app_config::StartupModel {
            name: "gear.brep".to_string(),
            url: "models/gear.brep".to_string(),
        });
        let bridge = BridgeController::new(config);
        bridge.start().await.unwrap();

        let calls = recorded_calls("FakeOccUrl");
        let names: Vec<String> = calls.iter().map(call_name).collect();
        assert_eq!(names, vec!["factory", "openFromUrl", "displayGround"]);
        assert_eq!(bridge.loaded_model().as_deref(), Some("gear.brep"));
        assert_eq!(bridge.phase(), BridgePhase::RuntimeReady);

        bridge.dispose();
        container.remove();
    }
}
