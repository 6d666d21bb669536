#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod confirm;
mod model_download;
mod pipeline;
mod recycling;
mod session;
mod types;
mod ui;

use anyhow::Result;
use crossbeam_channel::bounded;
use gpui::Application;
use gpui_component;
use model_download::ModelSource;

fn main() -> Result<()> {
    env_logger::init();

    let (preview_tx, preview_rx) = bounded(1);

    let model_source = ModelSource::default();

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, preview_rx, preview_tx, model_source.clone()) {
                eprintln!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
