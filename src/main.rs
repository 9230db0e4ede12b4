mod app_config;
mod boot;
mod bridge;
mod file_picker;
mod runtime;
mod surface;
mod viewer_app;

fn main() {
    console_error_panic_hook::set_once();
    viewer_app::run_viewer();
}
