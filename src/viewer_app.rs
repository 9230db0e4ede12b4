use std::rc::Rc;

use gloo::console;
use wasm_bindgen_futures::spawn_local;
use yew::prelude::*;

use occt_viewer_core::{BridgeError, BridgePhase};

use crate::app_config::{load_viewer_config, ViewerConfig};
use crate::bridge::BridgeController;

#[derive(Properties, PartialEq)]
pub(crate) struct ViewerAppProps {
    pub(crate) config: ViewerConfig,
}

/// What the status line shows besides the phase.
#[derive(Clone, Debug, Default, PartialEq)]
struct ViewerStatus {
    loaded_model: Option<String>,
    error: Option<BridgeError>,
}

impl ViewerStatus {
    fn from_bridge(bridge: &BridgeController) -> Self {
        Self {
            loaded_model: bridge.loaded_model(),
            error: bridge.last_error(),
        }
    }
}

#[function_component(ViewerApp)]
pub(crate) fn viewer_app(props: &ViewerAppProps) -> Html {
    let phase = use_state(BridgePhase::default);
    let status = use_state(ViewerStatus::default);
    let bridge = use_mut_ref(|| None::<Rc<BridgeController>>);

    {
        let phase = phase.clone();
        let status = status.clone();
        let bridge = bridge.clone();
        use_effect_with(props.config.clone(), move |config| {
            let controller = BridgeController::new(config.clone());
            let set_phase = phase.setter();
            controller.set_phase_hook(Some(Rc::new(move |next| set_phase.set(next))));
            *bridge.borrow_mut() = Some(Rc::clone(&controller));

            let starting = Rc::clone(&controller);
            spawn_local(async move {
                if let Err(err) = starting.start().await {
                    console::warn!("viewer: start failed", err.code());
                }
                status.set(ViewerStatus::from_bridge(&starting));
            });

            move || {
                controller.set_phase_hook(None);
                controller.dispose();
                bridge.borrow_mut().take();
            }
        });
    }

    let on_open_cad = {
        let bridge = bridge.clone();
        let status = status.clone();
        Callback::from(move |_event: MouseEvent| {
            let Some(controller) = bridge.borrow().clone() else {
                return;
            };
            let status = status.clone();
            spawn_local(async move {
                match controller.open_cad().await {
                    Ok(Some(model)) => {
                        console::log!("viewer: showing", model.name.clone());
                    }
                    Ok(None) => {}
                    Err(err) => {
                        console::warn!("viewer: open failed", err.code());
                    }
                }
                status.set(ViewerStatus::from_bridge(&controller));
            });
        })
    };

    let config = &props.config;
    let status_text = match &status.error {
        Some(err) => format!("{err}. {}", err.hint()),
        None => match &status.loaded_model {
            Some(name) => name.clone(),
            None => phase.label().to_string(),
        },
    };
    let status_class = if status.error.is_some() {
        "occt-status error"
    } else {
        "occt-status"
    };

    html! {
        <div class="occt-viewer">
            <div id={config.container_id.clone()} class="occt-container"></div>
            <nav class="occt-dock">
                <button
                    type="button"
                    class="dock-button"
                    title={format!("Open {} model", config.format_label)}
                    disabled={!phase.accepts_open()}
                    onclick={on_open_cad}
                >
                    {"CAD"}
                </button>
            </nav>
            <div class={status_class} data-phase={phase.label()}>
                {status_text}
            </div>
        </div>
    }
}

pub(crate) fn run_viewer() {
    let config = load_viewer_config();
    console::log!(
        "viewer: mounting",
        config.container_id.clone(),
        config.runtime_factory.clone()
    );
    let _app_handle = yew::Renderer::<ViewerApp>::with_props(ViewerAppProps { config }).render();
}
