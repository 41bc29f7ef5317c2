use schema_loom::api;
use schema_loom::gui::frontend::SchemaApp;
use schema_loom::persistence::settings::AppSettings;

use eframe::egui;

fn main() -> eframe::Result {
    env_logger::init();

    let settings = match AppSettings::load() {
        Ok(s) => s,
        Err(e) => {
            log::warn!("could not read settings, using defaults: {:#}", e);
            AppSettings::default()
        }
    };
    // Bring the embedded API up before the first fetch so a local endpoint answers
    if settings.api_enabled {
        if let Err(e) = api::server::start_server(&settings) {
            log::error!("failed to start API server: {:#}", e);
        }
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1300.0, 760.0])
            .with_min_inner_size([700.0, 420.0])
            .with_resizable(true),
        ..Default::default()
    };
    eframe::run_native(
        "Schema-Loom",
        options,
        Box::new(move |_cc| Ok(Box::new(SchemaApp::new(settings)) as Box<dyn eframe::App>)),
    )
}
