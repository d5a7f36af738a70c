// GUI entry point for tile-visualizer
// Single screen: tile gallery, room photo crop, composite preview and download

use eframe::egui;

mod app;
use app::TileVisualizerApp;

fn main() -> Result<(), eframe::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 760.0])
            .with_min_inner_size([900.0, 560.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Tile Visualizer",
        options,
        Box::new(|cc| Ok(Box::new(TileVisualizerApp::new(cc)))),
    )
}
